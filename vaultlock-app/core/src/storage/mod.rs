mod file;
mod memory;
mod store;

pub use file::{FileStore, RECORD_FILE_NAME};
pub use memory::MemoryStore;
pub use store::{CredentialStore, SecurityRecord};
