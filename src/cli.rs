use std::fmt::Display;

use argh::FromArgs;
use godot::prelude::{Dictionary, GodotString, ToVariant, Variant};
use log::LevelFilter;

use crate::model::{config::ConfigError, AvatarConfig};

#[derive(Debug)]
pub enum CliError {
    ParseFailure(argh::EarlyExit),
    EmptyText,
    InvalidScale { input: f32 },
    Config { path: String, reason: String },
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailure(e) => write!(f, "{}", e.output),
            Self::EmptyText => write!(f, "Nothing to say"),
            Self::InvalidScale { input } => write!(f, "Invalid scale: {input}"),
            Self::Config { path, reason } => write!(f, "Unable to use config {path}: {reason}"),
        }
    }
}

impl std::error::Error for CliError {}

/// libavatar command line interface
#[derive(Debug, FromArgs)]
pub struct Args {
    /// enable verbose logging, overridden by "quiet" if passed
    #[argh(switch, short = 'v', long = "verbose")]
    verbose: bool,
    /// disable all logging, overrides verbose
    #[argh(switch, short = 'q', long = "quiet")]
    quiet: bool,
    #[argh(subcommand)]
    commands: Option<Commands>,
}

impl Args {
    /// Parse some `args`. Args are expected to come from Godot user args.
    pub fn parse(args: &[&str]) -> Result<Self, CliError> {
        let r = Self::from_args(&[env!("CARGO_PKG_NAME")], args).map_err(CliError::ParseFailure)?;

        match &r.commands {
            Some(Commands::Say(c)) if c.text().is_empty() => return Err(CliError::EmptyText),
            Some(Commands::WithModel(WithModelCommand {
                scale: Some(scale), ..
            })) if !scale.is_finite() || *scale <= 0.0 => {
                return Err(CliError::InvalidScale { input: *scale })
            }
            _ => {}
        }

        Ok(r)
    }

    /// The level to install the logger with.
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Off
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    /// Convert self to a [Dictionary].
    ///
    /// # Note
    /// **All keys must always be provided!**
    pub fn to_dict(&self) -> Dictionary {
        let mut r = Dictionary::new();

        r.insert("verbose", self.verbose);
        r.insert("quiet", self.quiet);

        if let Some(c) = &self.commands {
            r.insert("has_command", true);

            match c {
                Commands::WithModel(c) => c.populate_dict(&mut r),
                Commands::Say(c) => c.populate_dict(&mut r),
            }
        } else {
            r.insert("has_command", false);
        }

        r
    }
}

trait GodotCommand {
    fn populate_dict(&self, dict: &mut Dictionary);
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum Commands {
    WithModel(WithModelCommand),
    Say(SayCommand),
}

/// Load an avatar on launch
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "with-model")]
pub struct WithModelCommand {
    /// path to the model to load
    #[argh(positional)]
    model_path: String,
    /// clip to layer over the upper body while talking
    #[argh(option)]
    gesture_clip: Option<String>,
    /// uniform model scale
    #[argh(option)]
    scale: Option<f32>,
    /// seed for idle motion, saccades and blinks
    #[argh(option)]
    seed: Option<u64>,
    /// path to a json config
    #[argh(option)]
    config: Option<String>,
}

impl WithModelCommand {
    /// The config file, if any, with the seed from the command line on top.
    pub fn avatar_config(&self) -> Result<AvatarConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => {
                let to_error = |reason: String| CliError::Config {
                    path: path.clone(),
                    reason,
                };
                let data = std::fs::read_to_string(path).map_err(|e| to_error(e.to_string()))?;

                AvatarConfig::from_json(&data).map_err(|e: ConfigError| to_error(e.to_string()))?
            }
            None => AvatarConfig::default(),
        };

        if self.seed.is_some() {
            config.seed = self.seed;
        }

        Ok(config)
    }
}

impl GodotCommand for WithModelCommand {
    fn populate_dict(&self, dict: &mut Dictionary) {
        dict.insert("command", "with_model");

        dict.insert("model_path", GodotString::from(&self.model_path));
        dict.insert(
            "gesture_clip",
            if let Some(v) = &self.gesture_clip {
                GodotString::from(v)
            } else {
                GodotString::new()
            },
        );
        dict.insert(
            "scale",
            if let Some(v) = self.scale {
                v.to_variant()
            } else {
                Variant::nil()
            },
        );

        let config_json = match self.avatar_config().and_then(|c| {
            c.to_json().map_err(|e| CliError::Config {
                path: self.config.clone().unwrap_or_default(),
                reason: e.to_string(),
            })
        }) {
            Ok(v) => GodotString::from(v),
            Err(e) => {
                log::error!("{e}");
                GodotString::new()
            }
        };
        dict.insert("config_json", config_json);
    }
}

/// Speak some text once the avatar is loaded
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "say")]
pub struct SayCommand {
    /// the text to speak
    #[argh(positional)]
    words: Vec<String>,
}

impl SayCommand {
    pub fn text(&self) -> String {
        self.words.join(" ").trim().to_string()
    }
}

impl GodotCommand for SayCommand {
    fn populate_dict(&self, dict: &mut Dictionary) {
        dict.insert("command", "say");

        dict.insert("text", GodotString::from(self.text()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        let args = Args::parse(&["--verbose"]).unwrap();

        assert_eq!(args.verbose, true);
        assert_eq!(args.quiet, false);
    }

    #[test]
    fn empty() {
        let args = Args::from_args(&["libavatar"], &[]).unwrap();

        assert_eq!(args.verbose, false);
        assert_eq!(args.quiet, false);
        assert!(args.commands.is_none());
        assert_eq!(args.log_level(), LevelFilter::Info);
    }

    #[test]
    fn no_command_verbose() {
        let args = Args::from_args(&["libavatar"], &["--verbose"]).unwrap();

        assert_eq!(args.verbose, true);
        assert_eq!(args.quiet, false);
        assert_eq!(args.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn no_command_quiet() {
        let args = Args::from_args(&["libavatar"], &["--quiet"]).unwrap();

        assert_eq!(args.verbose, false);
        assert_eq!(args.quiet, true);
        assert_eq!(args.log_level(), LevelFilter::Off);
    }

    #[test]
    fn no_command_quiet_verbose() {
        let args = Args::from_args(&["libavatar"], &["--quiet", "--verbose"]).unwrap();

        assert_eq!(args.verbose, true);
        assert_eq!(args.quiet, true);
        assert_eq!(args.log_level(), LevelFilter::Off);
    }

    mod with_model {
        use super::*;

        #[test]
        fn model_path_only() {
            let args = Args::parse(&["with-model", "./avatar.glb"]).unwrap();

            match args.commands.unwrap() {
                Commands::WithModel(v) => {
                    assert_eq!(v.model_path, "./avatar.glb");
                    assert!(v.gesture_clip.is_none());
                    assert!(v.scale.is_none());
                    assert!(v.seed.is_none());
                    assert!(v.config.is_none());
                    assert_eq!(v.avatar_config().unwrap(), AvatarConfig::default());
                }
                _ => assert!(false),
            }
        }

        #[test]
        fn all_options() {
            let args = Args::parse(&[
                "with-model",
                "./avatar.glb",
                "--gesture-clip",
                "./talking.glb",
                "--scale",
                "1.5",
                "--seed",
                "42",
            ])
            .unwrap();

            match args.commands.unwrap() {
                Commands::WithModel(v) => {
                    assert_eq!(v.gesture_clip.as_deref(), Some("./talking.glb"));
                    assert_eq!(v.scale, Some(1.5));
                    assert_eq!(v.avatar_config().unwrap().seed, Some(42));
                }
                _ => assert!(false),
            }
        }

        #[test]
        fn bad_scale() {
            assert!(Args::parse(&["with-model", "./avatar.glb", "--scale", "big"]).is_err());

            match Args::parse(&["with-model", "./avatar.glb", "--scale", "0"]) {
                Err(CliError::InvalidScale { input }) => assert_eq!(input, 0.0),
                v => panic!("{v:?}"),
            }
        }

        #[test]
        fn missing_config_file() {
            let args = Args::parse(&[
                "with-model",
                "./avatar.glb",
                "--config",
                "./__does_not_exist__.json",
            ])
            .unwrap();

            match args.commands.unwrap() {
                Commands::WithModel(v) => match v.avatar_config() {
                    Err(CliError::Config { path, .. }) => {
                        assert_eq!(path, "./__does_not_exist__.json")
                    }
                    v => panic!("{v:?}"),
                },
                _ => assert!(false),
            }
        }

        #[test]
        fn config_file_with_seed_override() {
            let path = std::env::temp_dir().join("libavatar_cli_config.json");
            std::fs::write(&path, r#"{ "words_per_minute": 120.0, "seed": 1 }"#).unwrap();
            let path = path.to_string_lossy().to_string();

            let args =
                Args::parse(&["with-model", "./avatar.glb", "--config", &path, "--seed", "7"])
                    .unwrap();

            match args.commands.unwrap() {
                Commands::WithModel(v) => {
                    let config = v.avatar_config().unwrap();
                    assert_eq!(config.words_per_minute, 120.0);
                    assert_eq!(config.seed, Some(7));
                }
                _ => assert!(false),
            }
        }

        #[test]
        fn missing_model_path() {
            assert!(Args::parse(&["with-model", "--seed", "1"]).is_err());
        }
    }

    mod say {
        use super::*;

        #[test]
        fn joins_words() {
            let args = Args::parse(&["say", "hello", "there"]).unwrap();

            match args.commands.unwrap() {
                Commands::Say(v) => assert_eq!(v.text(), "hello there"),
                _ => assert!(false),
            }
        }

        #[test]
        fn quoted_text() {
            let args = Args::parse(&["--verbose", "say", "good morning"]).unwrap();

            assert_eq!(args.verbose, true);
            match args.commands.unwrap() {
                Commands::Say(v) => assert_eq!(v.text(), "good morning"),
                _ => assert!(false),
            }
        }

        #[test]
        fn nothing_to_say() {
            match Args::parse(&["say"]) {
                Err(CliError::EmptyText) => {}
                v => panic!("{v:?}"),
            }
            assert!(matches!(Args::parse(&["say", "  "]), Err(CliError::EmptyText)));
        }
    }
}
