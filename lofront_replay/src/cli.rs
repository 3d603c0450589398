// lofront_replay/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Replays a recorded sensor session through the LiDAR odometry frontend.
///
/// Frontend options come from an optional TOML file, overridden by
/// `LOFRONT_`-prefixed environment variables (`__` separates nested keys,
/// e.g. `LOFRONT_KEYFRAME__TRANSLATION_THRESHOLD=2.0`).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The session TOML file to replay.
    #[arg(short, long)]
    pub session: PathBuf,

    /// Frontend configuration TOML. Built-in defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also feed ground-truth poses into the external-pose modality.
    #[arg(long, default_value_t = false)]
    pub ground_truth_as_pose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "lofront_replay",
            "--session",
            "run.toml",
            "-c",
            "frontend.toml",
            "--ground-truth-as-pose",
        ]);
        assert_eq!(cli.session, PathBuf::from("run.toml"));
        assert_eq!(cli.config, Some(PathBuf::from("frontend.toml")));
        assert!(cli.ground_truth_as_pose);
    }

    #[test]
    fn session_is_required() {
        assert!(Cli::try_parse_from(["lofront_replay"]).is_err());
    }
}
