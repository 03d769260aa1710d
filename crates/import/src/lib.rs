pub mod csv;
pub mod decode;

pub use csv::{read_export, ExclusionFn, ExportPartition, ImportError};
pub use decode::{decode_export, detect_delimiter, DecodeError, ExportEncoding};
