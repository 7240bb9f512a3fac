use crate::bytecode::ir::Program;

/// Error produced while encoding or decoding a binary image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageError {
    pub message: String,
}

impl ImageError {
    fn new(message: impl Into<String>) -> Self {
        ImageError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "image error: {}", self.message)
    }
}

impl std::error::Error for ImageError {}

/// Archive a program bundle into a binary image (`.spi`).
pub fn to_image(program: &Program) -> Result<Vec<u8>, ImageError> {
    let bytes = rkyv::to_bytes::<_, 1024>(program)
        .map_err(|e| ImageError::new(format!("serialize failed: {:?}", e)))?;
    Ok(bytes.to_vec())
}

/// Load a program bundle from a binary image, validating the archive.
pub fn from_image(bytes: &[u8]) -> Result<Program, ImageError> {
    rkyv::from_bytes::<Program>(bytes)
        .map_err(|e| ImageError::new(format!("deserialize failed: {:?}", e)))
}
