pub mod autostart;
pub mod backup;
pub mod ls;
pub mod mount_dir;
pub mod passwd;
pub mod run;
pub mod source;
pub mod test;
pub mod version;

pub use autostart::AutoStart;
pub use backup::Backup;
pub use ls::Ls;
pub use mount_dir::MountDir;
pub use passwd::Passwd;
pub use run::Run;
pub use source::Source;
pub use test::Test;
pub use version::Version;
