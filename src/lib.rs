//! cfb-rs - A Rust library for reading and writing Compound File Binary (CFB) / OLE
//! structured storage files.
//!
//! CFB is the container format underneath legacy Microsoft Office documents (.doc, .xls,
//! .ppt), Outlook .msg files, and Thumbs.db, among others. This crate implements the file
//! format itself -- sectors, the FAT/DIFAT/Mini-FAT allocators, and the red-black directory
//! tree -- without parsing any of the document formats stored inside it.
//!
//! # Example - reading an existing file
//!
//! ```no_run
//! use std::fs::File;
//! use cfb::{CompoundFile, UpdateMode, CfbConfiguration};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("document.doc")?;
//! let mut cf = CompoundFile::open(file, UpdateMode::ReadOnly, CfbConfiguration::default())?;
//!
//! let root = cf.root_sid();
//! for child in cf.children(root)? {
//!     println!("{}", cf.entry(child)?.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - creating a new file
//!
//! ```no_run
//! use std::fs::File;
//! use cfb::{CompoundFile, Version, CfbConfiguration};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cf = CompoundFile::<File>::new(Version::V3, CfbConfiguration::default());
//! let root = cf.root_sid();
//! cf.add_stream(root, "Contents", b"hello world")?;
//!
//! let mut out = File::create("new.cfb")?;
//! cf.save(&mut out)?;
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod compound_file;
pub mod config;
pub mod consts;
pub mod difat;
pub mod directory;
pub mod error;
pub mod header;
pub mod rbtree;
pub mod sector;
pub mod stream;

pub use compound_file::CompoundFile;
pub use config::{CfbConfiguration, UpdateMode, Version};
pub use directory::{DirectoryEntry, EntryType};
pub use error::{CfbError, Result};
