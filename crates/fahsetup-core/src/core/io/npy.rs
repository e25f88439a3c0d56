//! Writers for the NumPy `.npy` array format and `.npz` archives.
//!
//! Only little-endian, C-ordered data is produced. Structured (record) arrays are
//! supported so that heterogeneous tables can be stored without pickling.

use super::traits::Artifact;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGNMENT: usize = 64;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Shape {shape:?} holds {expected} elements but {actual} were given")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("Record has {actual} values but the layout declares {expected} fields")]
    RecordArity { expected: usize, actual: usize },
    #[error("Value for field '{field}' does not match its dtype '{descr}'")]
    FieldType { field: String, descr: String },
    #[error("Text of {length} characters exceeds the {width}-character field '{field}'")]
    TextTooLong {
        field: String,
        width: usize,
        length: usize,
    },
}

/// A fixed-size scalar that can be stored in an `.npy` array.
pub trait Element: Copy {
    const DESCR: &'static str;

    fn write_le(self, writer: &mut impl Write) -> io::Result<()>;
}

macro_rules! impl_element {
    ($($ty:ty => $descr:literal),* $(,)?) => {
        $(
            impl Element for $ty {
                const DESCR: &'static str = $descr;

                fn write_le(self, writer: &mut impl Write) -> io::Result<()> {
                    writer.write_all(&self.to_le_bytes())
                }
            }
        )*
    };
}

impl_element! {
    f64 => "<f8",
    f32 => "<f4",
    i64 => "<i8",
    i32 => "<i4",
    i8 => "|i1",
    u8 => "|u1",
}

impl Element for bool {
    const DESCR: &'static str = "|b1";

    fn write_le(self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&[u8::from(self)])
    }
}

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn write_header(writer: &mut impl Write, descr: &str, shape: &[usize]) -> io::Result<()> {
    let mut header = format!(
        "{{'descr': {}, 'fortran_order': False, 'shape': {}, }}",
        descr,
        shape_literal(shape)
    );

    let (version, length_bytes) = if header.len() + MAGIC.len() + 4 < u16::MAX as usize {
        (1u8, 2usize)
    } else {
        (2u8, 4usize)
    };
    let preamble = MAGIC.len() + 2 + length_bytes;
    let unpadded = preamble + header.len() + 1;
    let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
    header.extend(std::iter::repeat_n(' ', padding));
    header.push('\n');

    writer.write_all(MAGIC)?;
    writer.write_all(&[version, 0])?;
    if version == 1 {
        writer.write_all(&(header.len() as u16).to_le_bytes())?;
    } else {
        writer.write_all(&(header.len() as u32).to_le_bytes())?;
    }
    writer.write_all(header.as_bytes())
}

/// A homogeneous n-dimensional array borrowed from a flat, row-major slice.
#[derive(Debug, Clone)]
pub struct Array<'a, T: Element> {
    shape: Vec<usize>,
    data: &'a [T],
}

impl<'a, T: Element> Array<'a, T> {
    pub fn new(shape: &[usize], data: &'a [T]) -> Result<Self, NpyError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(NpyError::ShapeMismatch {
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// A one-dimensional array over the whole slice.
    pub fn vector(data: &'a [T]) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl<T: Element> Artifact for Array<'_, T> {
    type Error = NpyError;

    fn write_to(&self, writer: &mut impl Write) -> Result<(), NpyError> {
        write_header(writer, &format!("'{}'", T::DESCR), &self.shape)?;
        for &value in self.data {
            value.write_le(writer)?;
        }
        Ok(())
    }
}

/// Data type of one field of a structured array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int64,
    Float64,
    Bool,
    /// Fixed-width UCS-4 text holding up to the given number of characters.
    Unicode(usize),
}

impl FieldKind {
    pub fn descr(&self) -> String {
        match self {
            FieldKind::Int64 => "<i8".to_string(),
            FieldKind::Float64 => "<f8".to_string(),
            FieldKind::Bool => "|b1".to_string(),
            FieldKind::Unicode(width) => format!("<U{}", width),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    /// A text field just wide enough for the longest of `values` (at least one character).
    pub fn text_for<'s>(name: &str, values: impl IntoIterator<Item = &'s str>) -> Self {
        let width = values
            .into_iter()
            .map(|v| v.chars().count())
            .max()
            .unwrap_or(0)
            .max(1);
        Self::new(name, FieldKind::Unicode(width))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    fn write(&self, field: &Field, writer: &mut impl Write) -> Result<(), NpyError> {
        match (field.kind, self) {
            (FieldKind::Int64, Value::Int(v)) => v.write_le(writer)?,
            (FieldKind::Float64, Value::Float(v)) => v.write_le(writer)?,
            (FieldKind::Bool, Value::Bool(v)) => v.write_le(writer)?,
            (FieldKind::Unicode(width), Value::Text(text)) => {
                let mut written = 0;
                for c in text.chars() {
                    writer.write_all(&(c as u32).to_le_bytes())?;
                    written += 1;
                }
                for _ in written..width {
                    writer.write_all(&[0; 4])?;
                }
            }
            _ => {
                return Err(NpyError::FieldType {
                    field: field.name.clone(),
                    descr: field.kind.descr(),
                });
            }
        }
        Ok(())
    }

    fn check(&self, field: &Field) -> Result<(), NpyError> {
        let matches = matches!(
            (field.kind, self),
            (FieldKind::Int64, Value::Int(_))
                | (FieldKind::Float64, Value::Float(_))
                | (FieldKind::Bool, Value::Bool(_))
                | (FieldKind::Unicode(_), Value::Text(_))
        );
        if !matches {
            return Err(NpyError::FieldType {
                field: field.name.clone(),
                descr: field.kind.descr(),
            });
        }
        if let (FieldKind::Unicode(width), Value::Text(text)) = (field.kind, self) {
            let length = text.chars().count();
            if length > width {
                return Err(NpyError::TextTooLong {
                    field: field.name.clone(),
                    width,
                    length,
                });
            }
        }
        Ok(())
    }
}

/// A structured array: a table of records sharing one field layout.
///
/// A record array built with [`RecordArray::scalar`] is zero-dimensional and holds
/// exactly one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordArray {
    fields: Vec<Field>,
    records: Vec<Vec<Value>>,
    scalar: bool,
}

impl RecordArray {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            records: Vec::new(),
            scalar: false,
        }
    }

    pub fn scalar(fields: Vec<Field>, record: Vec<Value>) -> Result<Self, NpyError> {
        let mut array = Self::new(fields);
        array.push(record)?;
        array.scalar = true;
        Ok(array)
    }

    /// Appends a record after checking it against the field layout.
    pub fn push(&mut self, record: Vec<Value>) -> Result<(), NpyError> {
        if record.len() != self.fields.len() {
            return Err(NpyError::RecordArity {
                expected: self.fields.len(),
                actual: record.len(),
            });
        }
        for (value, field) in record.iter().zip(&self.fields) {
            value.check(field)?;
        }
        self.records.push(record);
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn descr(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|f| format!("('{}', '{}')", f.name, f.kind.descr()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{}]", fields)
    }
}

impl Artifact for RecordArray {
    type Error = NpyError;

    fn write_to(&self, writer: &mut impl Write) -> Result<(), NpyError> {
        let shape = if self.scalar {
            vec![]
        } else {
            vec![self.records.len()]
        };
        write_header(writer, &self.descr(), &shape)?;
        for record in &self.records {
            for (value, field) in record.iter().zip(&self.fields) {
                value.write(field, writer)?;
            }
        }
        Ok(())
    }
}

/// Writes named arrays into a deflate-compressed `.npz` archive.
pub struct NpzWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl NpzWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, NpyError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Seek> NpzWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
        }
    }

    /// Stores `array` as the member `{name}.npy`.
    pub fn add(
        &mut self,
        name: &str,
        array: &impl Artifact<Error = NpyError>,
    ) -> Result<(), NpyError> {
        let mut buffer = Vec::new();
        array.write_to(&mut buffer)?;
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(format!("{}.npy", name), options)?;
        self.zip.write_all(&buffer)?;
        Ok(())
    }

    pub fn finish(self) -> Result<W, NpyError> {
        Ok(self.zip.finish()?)
    }
}
