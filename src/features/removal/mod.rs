mod gateway;
pub mod handler;
mod models;
mod validator;

pub use gateway::SegmentationGateway;
pub(crate) use gateway::panic_message;
pub use handler::{create_removal_router, read_upload};
pub use models::{ProcessedImage, RemoveBackgroundForm, UploadedImage};
pub use validator::UploadValidator;
