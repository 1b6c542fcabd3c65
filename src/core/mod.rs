pub mod globals;
pub mod process;

pub use globals::{DEFAULT_CHUNK_SIZE, PAGE_MASK, PAGE_SIZE, TOKIO_RUNTIME};
pub use process::{MemoryAccess, ModuleInfo, PageRange, PointerWidth, ProcessContext};
