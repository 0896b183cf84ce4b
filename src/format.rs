//! The fixed table of supported document formats.
//!
//! Every other module looks formats up here: the gateway to validate uploads
//! and pick a content-type, the orchestrator to reject bad files before they
//! hit the network, the server to list formats for a UI. The table is
//! compiled in and never changes at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the document formats the remote service is asked to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Doc,
    Txt,
    Rtf,
    Odt,
    Html,
}

/// Static description of a [`FileType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub key: FileType,
    pub extension: &'static str,
    pub content_type: &'static str,
    pub display_name: &'static str,
}

const FORMATS: [FormatDescriptor; 7] = [
    FormatDescriptor {
        key: FileType::Pdf,
        extension: "pdf",
        content_type: "application/pdf",
        display_name: "PDF Document",
    },
    FormatDescriptor {
        key: FileType::Docx,
        extension: "docx",
        content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        display_name: "Word Document (DOCX)",
    },
    FormatDescriptor {
        key: FileType::Doc,
        extension: "doc",
        content_type: "application/msword",
        display_name: "Word Document (DOC)",
    },
    FormatDescriptor {
        key: FileType::Txt,
        extension: "txt",
        content_type: "text/plain",
        display_name: "Plain Text",
    },
    FormatDescriptor {
        key: FileType::Rtf,
        extension: "rtf",
        content_type: "application/rtf",
        display_name: "Rich Text Format",
    },
    FormatDescriptor {
        key: FileType::Odt,
        extension: "odt",
        content_type: "application/vnd.oasis.opendocument.text",
        display_name: "OpenDocument Text",
    },
    FormatDescriptor {
        key: FileType::Html,
        extension: "html",
        content_type: "text/html",
        display_name: "HTML Document",
    },
];

impl FileType {
    /// All formats, in table order.
    pub const ALL: [FileType; 7] = [
        FileType::Pdf,
        FileType::Docx,
        FileType::Doc,
        FileType::Txt,
        FileType::Rtf,
        FileType::Odt,
        FileType::Html,
    ];

    pub fn descriptor(self) -> &'static FormatDescriptor {
        // FORMATS is declared in the same order as the enum.
        &FORMATS[self as usize]
    }

    pub fn extension(self) -> &'static str {
        self.descriptor().extension
    }

    pub fn content_type(self) -> &'static str {
        self.descriptor().content_type
    }

    pub fn display_name(self) -> &'static str {
        self.descriptor().display_name
    }

    /// The lower-case format key, e.g. `"docx"`.
    pub fn as_str(self) -> &'static str {
        self.extension()
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`FileType::from_str`] for keys outside the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown format '{}' (expected one of: {})",
            self.0,
            supported_extensions()
        )
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for FileType {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        FORMATS
            .iter()
            .find(|d| d.extension == key)
            .map(|d| d.key)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

/// Every descriptor in table order.
pub fn all_formats() -> &'static [FormatDescriptor] {
    &FORMATS
}

/// Comma-separated list of supported extensions, used in error messages.
pub fn supported_extensions() -> String {
    FORMATS
        .iter()
        .map(|d| d.extension)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lower-cased text after the last `.` of `file_name`, or the whole
/// lower-cased name when it has no dot.
pub fn file_extension(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    match lower.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => lower,
    }
}

/// Detect the format of a file from its name.
pub fn detect_format(file_name: &str) -> Option<FileType> {
    file_extension(file_name).parse().ok()
}

/// Output format used when the caller did not pick one: PDFs become DOCX,
/// everything else becomes PDF.
pub fn default_output(input: FileType) -> FileType {
    match input {
        FileType::Pdf => FileType::Docx,
        _ => FileType::Pdf,
    }
}

/// Derive the filename of a converted file.
///
/// The extension of `original` is swapped for the output format's. Names
/// without a usable extension (no dot, or only a leading dot) fall back to
/// `converted-file.<ext>`.
pub fn output_file_name(original: &str, output: FileType) -> String {
    match original.rfind('.') {
        Some(idx) if idx > 0 => format!("{}.{}", &original[..idx], output.extension()),
        _ => format!("converted-file.{}", output.extension()),
    }
}

/// `max_bytes` expressed in MB for user-facing messages.
///
/// Whole numbers render without a fractional part (`10`, not `10.0`).
pub fn size_limit_mb(max_bytes: u64) -> String {
    let mb = max_bytes as f64 / 1024.0 / 1024.0;
    format!("{}", mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_enum_order() {
        for ft in FileType::ALL {
            assert_eq!(ft.descriptor().key, ft);
        }
        assert_eq!(all_formats().len(), FileType::ALL.len());
    }

    #[test]
    fn content_types() {
        assert_eq!(FileType::Pdf.content_type(), "application/pdf");
        assert_eq!(FileType::Doc.content_type(), "application/msword");
        assert_eq!(
            FileType::Odt.content_type(),
            "application/vnd.oasis.opendocument.text"
        );
        assert_eq!(FileType::Html.display_name(), "HTML Document");
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("DOCX".parse::<FileType>().unwrap(), FileType::Docx);
        assert_eq!(" pdf ".parse::<FileType>().unwrap(), FileType::Pdf);
        assert!("xlsx".parse::<FileType>().is_err());
        assert!("".parse::<FileType>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_keys() {
        let json = serde_json::to_string(&FileType::Rtf).unwrap();
        assert_eq!(json, "\"rtf\"");
        let back: FileType = serde_json::from_str("\"html\"").unwrap();
        assert_eq!(back, FileType::Html);
    }

    #[test]
    fn detect_from_file_name() {
        assert_eq!(detect_format("report.PDF"), Some(FileType::Pdf));
        assert_eq!(detect_format("my.notes.txt"), Some(FileType::Txt));
        assert_eq!(detect_format("archive.tar.gz"), None);
        assert_eq!(detect_format("README"), None);
        // A bare extension-looking name is still a txt file.
        assert_eq!(detect_format(".txt"), Some(FileType::Txt));
    }

    #[test]
    fn default_output_policy() {
        assert_eq!(default_output(FileType::Pdf), FileType::Docx);
        for ft in FileType::ALL.into_iter().filter(|f| *f != FileType::Pdf) {
            assert_eq!(default_output(ft), FileType::Pdf);
        }
    }

    #[test]
    fn output_name_swaps_extension() {
        assert_eq!(output_file_name("thesis.pdf", FileType::Docx), "thesis.docx");
        assert_eq!(
            output_file_name("Q3.report.DOC", FileType::Pdf),
            "Q3.report.pdf"
        );
    }

    #[test]
    fn output_name_falls_back_without_extension() {
        assert_eq!(output_file_name("notes", FileType::Txt), "converted-file.txt");
        assert_eq!(output_file_name(".pdf", FileType::Docx), "converted-file.docx");
    }

    #[test]
    fn output_name_is_idempotent() {
        let a = output_file_name("letter.odt", FileType::Html);
        let b = output_file_name("letter.odt", FileType::Html);
        assert_eq!(a, b);
    }

    #[test]
    fn supported_extensions_lists_every_format() {
        assert_eq!(supported_extensions(), "pdf, docx, doc, txt, rtf, odt, html");
    }

    #[test]
    fn size_limit_rendering() {
        assert_eq!(size_limit_mb(10_485_760), "10");
        assert_eq!(size_limit_mb(1_572_864), "1.5");
    }
}
