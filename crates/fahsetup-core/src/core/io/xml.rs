use std::io::{self, Write};

/// Escapes the five XML special characters for use in text or attribute values.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Streaming writer for small, pretty-printed XML documents indented with tabs.
pub struct XmlWriter<'w, W: Write> {
    writer: &'w mut W,
    depth: usize,
    open: Vec<String>,
}

impl<'w, W: Write> XmlWriter<'w, W> {
    pub fn new(writer: &'w mut W) -> Self {
        Self {
            writer,
            depth: 0,
            open: Vec::new(),
        }
    }

    pub fn declaration(&mut self) -> io::Result<()> {
        writeln!(self.writer, "<?xml version=\"1.0\" ?>")
    }

    fn indent(&mut self) -> io::Result<()> {
        for _ in 0..self.depth {
            self.writer.write_all(b"\t")?;
        }
        Ok(())
    }

    fn tag(&mut self, name: &str, attributes: &[(&str, String)]) -> io::Result<()> {
        write!(self.writer, "<{}", name)?;
        for (key, value) in attributes {
            write!(self.writer, " {}=\"{}\"", key, escape(value))?;
        }
        Ok(())
    }

    /// Opens an element; it stays open until the matching [`XmlWriter::end`].
    pub fn start(&mut self, name: &str, attributes: &[(&str, String)]) -> io::Result<()> {
        self.indent()?;
        self.tag(name, attributes)?;
        writeln!(self.writer, ">")?;
        self.open.push(name.to_string());
        self.depth += 1;
        Ok(())
    }

    /// Writes a self-closing element.
    pub fn empty(&mut self, name: &str, attributes: &[(&str, String)]) -> io::Result<()> {
        self.indent()?;
        self.tag(name, attributes)?;
        writeln!(self.writer, "/>")
    }

    /// Writes an element holding only text content on a single line.
    pub fn text(&mut self, name: &str, text: &str) -> io::Result<()> {
        self.indent()?;
        writeln!(self.writer, "<{}>{}</{}>", name, escape(text), name)
    }

    /// Closes the innermost open element.
    pub fn end(&mut self) -> io::Result<()> {
        let name = self.open.pop().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no open XML element to close")
        })?;
        self.depth -= 1;
        self.indent()?;
        writeln!(self.writer, "</{}>", name)
    }

    /// Closes every element still open.
    pub fn finish(mut self) -> io::Result<()> {
        while !self.open.is_empty() {
            self.end()?;
        }
        Ok(())
    }
}
