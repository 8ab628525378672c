pub mod message;
pub mod recording;
pub mod text;
