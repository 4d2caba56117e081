use crate::primitive::Primitive;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// PGAS comparison harness - runs every implementation's driver and writes
/// baseline-normalized latency and bandwidth reports
///
/// With no flags the built-in reference setup is used.
#[derive(Parser, Debug, Default)]
#[clap(version, about, long_about = None)]
pub struct CompareArgs {
    /// JSON harness configuration (implementations, launcher, primitives)
    #[clap(long, help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Report directory; removed and recreated on every run
    #[clap(long, help_heading = "Configuration")]
    pub report_dir: Option<PathBuf>,

    /// Trials per implementation and primitive; must be odd
    #[clap(long, help_heading = "Configuration")]
    pub median_n: Option<usize>,

    /// Iterations for latency-only primitives
    #[clap(long, help_heading = "Configuration")]
    pub ntimes: Option<usize>,

    /// Iterations for bandwidth primitives
    #[clap(long, help_heading = "Configuration")]
    pub bw_ntimes: Option<usize>,

    /// Largest message size for bandwidth sweeps (bytes)
    #[clap(long, help_heading = "Configuration")]
    pub msg_size_max: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = ArgAction::Count, help_heading = "Logging")]
    pub verbose: u8,

    /// Also write plain-text logs to this file
    #[clap(long, help_heading = "Logging")]
    pub log_file: Option<PathBuf>,
}

/// Benchmark type accepted for compatibility with the legacy suite
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BenchType {
    Latency,
    #[value(alias = "bw")]
    Bandwidth,
}

/// PGAS primitive benchmark driver - times one primitive across two peers
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct DriverArgs {
    /// Primitive to benchmark
    #[clap(short = 'b', long = "bench", value_enum)]
    pub routine: Primitive,

    /// Number of iterations of the timed loop
    #[clap(short = 'n', long, default_value_t = crate::defaults::DRIVER_NTIMES)]
    pub ntimes: usize,

    /// Generate powers-of-two message sizes up to this maximum (bytes)
    #[clap(short = 's', long, group = "msg_size")]
    pub msg_size_max: Option<usize>,

    /// Comma-separated list of specific message sizes (bytes)
    #[clap(short = 'M', long, group = "msg_size", value_delimiter = ',')]
    pub msg_sizes: Option<Vec<usize>>,

    /// Smallest message size; sizes double up to --max
    #[clap(long, conflicts_with = "msg_size", help_heading = "Legacy Options")]
    pub min: Option<usize>,

    /// Largest message size for --min/--max sweeps
    #[clap(long, conflicts_with = "msg_size", help_heading = "Legacy Options")]
    pub max: Option<usize>,

    /// Benchmark type; results always include latency
    #[clap(long, value_enum, help_heading = "Legacy Options")]
    pub benchtype: Option<BenchType>,

    /// Number of peers in the local world
    #[clap(short = 'p', long, default_value_t = crate::defaults::PEERS)]
    pub peers: usize,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_args_have_no_required_flags() {
        let args = CompareArgs::try_parse_from(["pgas-compare"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.median_n.is_none());
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn test_driver_args_defaults() {
        let args = DriverArgs::try_parse_from(["pgas-bench", "--bench", "barrier"]).unwrap();
        assert_eq!(args.routine, Primitive::Barrier);
        assert_eq!(args.ntimes, 1000);
        assert_eq!(args.peers, 2);
        assert!(args.msg_size_max.is_none());
    }

    #[test]
    fn test_driver_args_parse_size_list() {
        let args =
            DriverArgs::try_parse_from(["pgas-bench", "-b", "put", "-M", "1,8,64"]).unwrap();
        assert_eq!(args.msg_sizes, Some(vec![1, 8, 64]));
    }

    #[test]
    fn test_driver_rejects_both_size_options() {
        let result = DriverArgs::try_parse_from([
            "pgas-bench",
            "--bench",
            "get",
            "--msg-size-max",
            "64",
            "--msg-sizes",
            "1,2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_driver_rejects_min_with_size_list() {
        let result = DriverArgs::try_parse_from([
            "pgas-bench", "--bench", "get", "--msg-sizes", "1,2", "--min", "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_driver_accepts_legacy_invocation() {
        let args = DriverArgs::try_parse_from([
            "pgas-bench",
            "--bench",
            "shmem_get",
            "--benchtype",
            "latency",
            "--ntimes",
            "100",
            "--min",
            "1",
            "--max",
            "1048576",
        ])
        .unwrap();
        assert_eq!(args.routine, Primitive::Get);
        assert_eq!(args.benchtype, Some(BenchType::Latency));
        assert_eq!(args.max, Some(1_048_576));
    }

    #[test]
    fn test_driver_rejects_unknown_bench() {
        let err = DriverArgs::try_parse_from(["pgas-bench", "--bench", "broadcast"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("barrier"));
    }
}
