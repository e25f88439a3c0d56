use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Defines the interface shared by every artifact written into a run directory.
///
/// Implementors hold (or borrow) the data of a single file and know how to serialize
/// it to any writer; writing to a path is provided on top of that.
pub trait Artifact {
    /// The error type for serialization.
    type Error: Error + From<io::Error>;

    /// Serializes the artifact to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be represented in the target format or
    /// the writer fails.
    fn write_to(&self, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Creates (or truncates) the file at `path` and serializes the artifact into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
