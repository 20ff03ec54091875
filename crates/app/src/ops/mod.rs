pub mod directory;
pub mod init;
pub mod keys;
pub mod read;
pub mod send;
pub mod version;
pub mod watch;

pub use directory::Directory;
pub use init::Init;
pub use keys::Keys;
pub use read::Read;
pub use send::SendMessage;
pub use version::Version;
pub use watch::Watch;
