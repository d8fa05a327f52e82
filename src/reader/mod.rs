pub mod session;
pub mod state;

pub use session::{Collaborators, ReaderSession, ReaderSnapshot};
pub use state::PageCursor;
