//! Artifact collections: one source expanding into many artifacts.

pub mod imagetxt;

pub use imagetxt::{ImageEntry, ImageTxt, ImageTxtOptions};
