pub mod header;
pub mod block;
pub mod chain;
pub mod stream;
pub mod directory;
pub mod container;
pub mod check;

pub use header::Header;
pub use block::BlockView;
pub use chain::{BlockResolver, ChainResolver, ChainTable};
pub use stream::{DocumentStream, StreamError};
pub use directory::{DirEntry, Directory, EntryKind};
pub use container::{Container, ContainerError, ContainerOptions, EntryInfo};
pub use check::{check, CheckReport, ChainHealth, Verdict};
