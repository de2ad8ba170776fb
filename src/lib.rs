pub mod animator;
mod cli;
pub mod clip;
mod logger;
pub mod model;
mod puppets;
mod receivers;
pub mod rig;
pub mod scene;
pub mod session;
pub mod speech;

pub use logger::Logger;

use godot::prelude::*;

/// Easy [GodotString] creation. :lenny:
macro_rules! gstring {
    ($string:expr) => {
        GodotString::from($string)
    };
}
pub(crate) use gstring;

/// Easy [GodotString] as a [Variant] creation.
macro_rules! vstring {
    ($string:expr) => {
        gstring!($string).to_variant()
    };
}
pub(crate) use vstring;

/// Helper struct for information about the libavatar library.
#[derive(Debug, Default, GodotClass)]
struct LibAvatar;

#[godot_api]
impl RefCountedVirtual for LibAvatar {
    fn init(_base: godot::obj::Base<Self::Base>) -> Self {
        Self
    }
}

#[godot_api]
impl LibAvatar {
    /// A mapping of various libavatar metadata.
    #[func]
    fn metadata() -> Dictionary {
        let mut mapping = Dictionary::new();

        let is_debug = cfg!(debug_assertions);
        mapping.insert("DEBUG", is_debug);
        mapping.insert("RELEASE", !is_debug);

        mapping.insert("VERSION", env!("CARGO_PKG_VERSION"));
        mapping.insert("VERSION_MAJOR", env!("CARGO_PKG_VERSION_MAJOR"));
        mapping.insert("VERSION_MINOR", env!("CARGO_PKG_VERSION_MINOR"));
        mapping.insert("VERSION_PATCH", env!("CARGO_PKG_VERSION_PATCH"));

        mapping.insert("LIBAVATAR_AUTHORS", env!("CARGO_PKG_AUTHORS"));

        mapping
    }

    /// Parse user args, install the logger and describe the requested command.
    ///
    /// On failure the dictionary only has `has_command` and `error`.
    #[func]
    fn parse_args(args: PackedStringArray) -> Dictionary {
        let args = args
            .as_slice()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>();
        let args = args.iter().map(String::as_str).collect::<Vec<_>>();

        match cli::Args::parse(&args) {
            Ok(v) => {
                logger::init(v.log_level());
                v.to_dict()
            }
            Err(e) => {
                logger::ensure_init();
                log::error!("{e}");

                let mut r = Dictionary::new();
                r.insert("has_command", false);
                r.insert("error", vstring!(e.to_string()));

                r
            }
        }
    }
}

struct GodotExtension;

#[gdextension]
unsafe impl ExtensionLibrary for GodotExtension {}
