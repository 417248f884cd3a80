// Declare submodules
mod critique;
mod detect;
mod extraction;
mod verify;

pub use critique::critique_prompt;
pub use detect::document_type_prompt;
pub use extraction::{extraction_prompt, focused_reextraction_prompt};
pub use verify::member_verification_prompt;
