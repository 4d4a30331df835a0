pub mod auth;
pub mod cat;
pub mod daemon;
pub mod init;
pub mod ls;
pub mod status;

pub use auth::Auth;
pub use cat::Cat;
pub use daemon::Daemon;
pub use init::Init;
pub use ls::Ls;
pub use status::Status;
