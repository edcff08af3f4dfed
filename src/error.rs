/// Error type for document model, pixel access and project file operations.
#[derive(Debug)]
pub enum DocError {
    /// Read or write of a property name that has no definition.
    UnknownProperty(String),
    OutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    /// Two buffers that must share dimensions do not.
    SizeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    UnregisteredClass(String),
    DuplicateClass(String),
    UnsupportedLayerKind(String),
    UnknownLayer(String),
    UnknownFrame(String),
    InvalidArgument(String),
    InvalidFormat(String),
    Json(serde_json::Error),
    Io(std::io::Error),
    Image(image::ImageError),
    Gif(String),
}

impl std::fmt::Display for DocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocError::UnknownProperty(name) => write!(f, "Unknown property '{}'", name),
            DocError::OutOfBounds { x, y, width, height } => {
                write!(f, "Pixel ({}, {}) outside {}×{} buffer", x, y, width, height)
            }
            DocError::SizeMismatch { expected, found } => write!(
                f,
                "Size mismatch: expected {}×{}, found {}×{}",
                expected.0, expected.1, found.0, found.1
            ),
            DocError::UnregisteredClass(name) => write!(f, "Class '{}' is not registered", name),
            DocError::DuplicateClass(name) => write!(f, "Class '{}' is already registered", name),
            DocError::UnsupportedLayerKind(kind) => {
                write!(f, "Operation not supported on {} layers", kind)
            }
            DocError::UnknownLayer(id) => write!(f, "No layer with id '{}'", id),
            DocError::UnknownFrame(id) => write!(f, "No frame with id '{}'", id),
            DocError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            DocError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
            DocError::Json(e) => write!(f, "JSON error: {}", e),
            DocError::Io(e) => write!(f, "I/O error: {}", e),
            DocError::Image(e) => write!(f, "Image encode error: {}", e),
            DocError::Gif(e) => write!(f, "GIF encode error: {}", e),
        }
    }
}

impl std::error::Error for DocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocError::Json(e) => Some(e),
            DocError::Io(e) => Some(e),
            DocError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DocError {
    fn from(e: std::io::Error) -> Self {
        DocError::Io(e)
    }
}

impl From<serde_json::Error> for DocError {
    fn from(e: serde_json::Error) -> Self {
        DocError::Json(e)
    }
}

impl From<image::ImageError> for DocError {
    fn from(e: image::ImageError) -> Self {
        DocError::Image(e)
    }
}

impl From<gif::EncodingError> for DocError {
    fn from(e: gif::EncodingError) -> Self {
        DocError::Gif(e.to_string())
    }
}

pub type DocResult<T> = Result<T, DocError>;
