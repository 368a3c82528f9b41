use std::path::PathBuf;

use audiorip_core::{JobOptions, SplitMode};
use clap::{builder::ValueParser, value_parser, Arg, ArgAction, ArgMatches, Command};

/// Parse a tempo factor, which must be a finite positive number.
pub fn parse_speed(value: &str) -> Result<f64, String> {
    let speed: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid speed '{value}'"))?;

    if !speed.is_finite() || speed <= 0.0 {
        return Err("speed must be greater than zero".into());
    }

    Ok(speed)
}

pub fn build_cli() -> Command {
    Command::new("audiorip")
        .about("Extract the audio of one or more videos to mp3")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("TOML configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("speed")
                .short('s')
                .long("speed")
                .value_name("FACTOR")
                .help("Tempo factor applied to the audio (e.g. 1.5)")
                .value_parser(ValueParser::new(parse_speed)),
        )
        .arg(
            Arg::new("downsample")
                .short('d')
                .long("downsample")
                .help("Resample the audio to 22050 Hz")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-downsample")
                .long("no-downsample")
                .help("Keep the original sample rate even if the config downsamples")
                .conflicts_with("downsample")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("split")
                .long("split")
                .value_name("SECONDS")
                .help("Merge all inputs and split the result into segments of SECONDS")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("no-split")
                .long("no-split")
                .help("Keep the result whole even if the config splits it")
                .conflicts_with("split")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory where the audio files will be written")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print job events as JSON lines on stdout")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("inputs")
                .value_name("INPUT")
                .help("Video files to extract audio from")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub speed: Option<f64>,
    /// Set only when a flag chose either way.
    pub downsample: Option<bool>,
    pub split: Option<SplitMode>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
    pub inputs: Vec<PathBuf>,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config: matches.get_one::<PathBuf>("config").cloned(),
            speed: matches.get_one::<f64>("speed").copied(),
            downsample: if matches.get_flag("downsample") {
                Some(true)
            } else if matches.get_flag("no-downsample") {
                Some(false)
            } else {
                None
            },
            split: if matches.get_flag("no-split") {
                Some(SplitMode::None)
            } else {
                matches
                    .get_one::<u32>("split")
                    .map(|&seconds| SplitMode::Fixed { seconds })
            },
            output_dir: matches.get_one::<PathBuf>("output-dir").cloned(),
            json: matches.get_flag("json"),
            inputs: matches
                .get_many::<PathBuf>("inputs")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Job options: configured defaults with the flags given on top.
    pub fn job_options(&self, defaults: &JobOptions) -> JobOptions {
        let mut options = defaults.clone();
        if let Some(speed) = self.speed {
            options.speed = speed;
        }
        if let Some(downsample) = self.downsample {
            options.downsample = downsample;
        }
        if let Some(split) = self.split {
            options.split = split;
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        build_cli()
            .try_get_matches_from(args)
            .map(|m| CliArgs::from_matches(&m))
    }

    #[test]
    fn parse_speed_accepts_positive_numbers() {
        assert_eq!(parse_speed("1.5").unwrap(), 1.5);
        assert_eq!(parse_speed(" 2 ").unwrap(), 2.0);
    }

    #[test]
    fn parse_speed_rejects_invalid_values() {
        assert!(parse_speed("0").is_err());
        assert!(parse_speed("-1").is_err());
        assert!(parse_speed("fast").is_err());
        assert!(parse_speed("inf").is_err());
        assert!(parse_speed("NaN").is_err());
    }

    #[test]
    fn parses_all_flags() {
        let args = parse(&[
            "audiorip", "--config", "a.toml", "--speed", "1.25", "--downsample", "--split", "600",
            "-o", "out", "--json", "a.mp4", "b.mp4",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("a.toml")));
        assert_eq!(args.speed, Some(1.25));
        assert_eq!(args.downsample, Some(true));
        assert_eq!(args.split, Some(SplitMode::Fixed { seconds: 600 }));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert!(args.json);
        assert_eq!(args.inputs, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
    }

    #[test]
    fn requires_an_input() {
        assert!(parse(&["audiorip"]).is_err());
    }

    #[test]
    fn rejects_contradicting_flags() {
        assert!(parse(&["audiorip", "--split", "60", "--no-split", "a.mp4"]).is_err());
        assert!(parse(&["audiorip", "--downsample", "--no-downsample", "a.mp4"]).is_err());
    }

    #[test]
    fn negative_flags_turn_configured_defaults_off() {
        let defaults = JobOptions {
            speed: 1.0,
            downsample: true,
            split: SplitMode::Fixed { seconds: 30 },
        };

        let options = parse(&["audiorip", "--no-split", "--no-downsample", "a.mp4"])
            .unwrap()
            .job_options(&defaults);

        assert!(!options.downsample);
        assert_eq!(options.split, SplitMode::None);
    }

    #[test]
    fn rejects_zero_split() {
        assert!(parse(&["audiorip", "--split", "0", "a.mp4"]).is_err());
    }

    #[test]
    fn flags_override_configured_defaults() {
        let defaults = JobOptions {
            speed: 2.0,
            downsample: true,
            split: SplitMode::Fixed { seconds: 30 },
        };

        let untouched = parse(&["audiorip", "a.mp4"]).unwrap().job_options(&defaults);
        assert_eq!(untouched, defaults);

        let overridden = parse(&["audiorip", "--speed", "0.5", "--split", "90", "a.mp4"])
            .unwrap()
            .job_options(&defaults);
        assert_eq!(overridden.speed, 0.5);
        assert!(overridden.downsample);
        assert_eq!(overridden.split, SplitMode::Fixed { seconds: 90 });
    }
}
