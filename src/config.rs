use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::here;

/// Runtime configuration, parsed once from the process argv via
/// `pico-args`.
#[derive(Debug, Clone)]
pub struct Config {
    pub path_input_image: Option<PathBuf>,
    pub path_bitstream: Option<PathBuf>,
    pub path_output_image: Option<PathBuf>,

    /// example-search window size (side length of the causal search window).
    pub ex_win: u32,
    /// max number of candidates retained per example-search basic parameter map.
    pub ex_num: u32,
    /// adaptive-prediction training window size.
    pub pr_win: u32,
    /// max number of candidates retained per adaptive-prediction basic parameter map.
    pub pr_num: u32,
    /// number of context parameter units (feature buckets).
    pub cs_num: u32,
    /// template patch radius.
    pub tp_rad: u32,
    /// example-search distance penalty weight.
    pub tp_wgt: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path_input_image: None,
            path_bitstream: None,
            path_output_image: None,
            ex_win: 80,
            ex_num: 64,
            pr_win: 10,
            pr_num: 25,
            cs_num: 16,
            tp_rad: 3,
            tp_wgt: 0.030,
        }
    }
}

impl Config {
    /// Parses CLI flags out of raw process arguments (excluding argv[0]):
    /// `-i/--input -b/--bitstream -o/--output -s/--ex_win -e/--ex_num
    /// -t/--pr_win -p/--pr_num -c/--cs_num -r/--tp_rad -w/--tp_wgt`.
    pub fn parse(raw_args: Vec<std::ffi::OsString>) -> Result<Self> {
        let mut parser = pico_args::Arguments::from_vec(raw_args);
        let mut cfg = Config::default();

        cfg.path_input_image = parser
            .opt_value_from_str(["-i", "--input"])
            .context(here!())?;
        cfg.path_bitstream = parser
            .opt_value_from_str(["-b", "--bitstream"])
            .context(here!())?;
        cfg.path_output_image = parser
            .opt_value_from_str(["-o", "--output"])
            .context(here!())?;

        if let Some(v) = parser
            .opt_value_from_str::<_, u32>(["-s", "--ex_win"])
            .context(here!())?
        {
            cfg.ex_win = v;
        }
        if let Some(v) = parser
            .opt_value_from_str::<_, u32>(["-e", "--ex_num"])
            .context(here!())?
        {
            cfg.ex_num = v;
        }
        if let Some(v) = parser
            .opt_value_from_str::<_, u32>(["-t", "--pr_win"])
            .context(here!())?
        {
            cfg.pr_win = v;
        }
        if let Some(v) = parser
            .opt_value_from_str::<_, u32>(["-p", "--pr_num"])
            .context(here!())?
        {
            cfg.pr_num = v;
        }
        if let Some(v) = parser
            .opt_value_from_str::<_, u32>(["-c", "--cs_num"])
            .context(here!())?
        {
            cfg.cs_num = v;
        }
        if let Some(v) = parser
            .opt_value_from_str::<_, u32>(["-r", "--tp_rad"])
            .context(here!())?
        {
            cfg.tp_rad = v;
        }
        if let Some(v) = parser
            .opt_value_from_str::<_, f64>(["-w", "--tp_wgt"])
            .context(here!())?
        {
            cfg.tp_wgt = v;
        }

        let remaining = parser.finish();
        if !remaining.is_empty() {
            anyhow::bail!("unrecognized arguments: {:?}", remaining);
        }

        Ok(cfg)
    }

    /// True when a bitstream is being produced from a source image.
    pub fn is_encoder(&self) -> bool {
        self.path_input_image.is_some() && self.path_bitstream.is_some()
    }

    /// True when an image is being reconstructed from a bitstream.
    pub fn is_decoder(&self) -> bool {
        self.path_bitstream.is_some() && self.path_output_image.is_some()
    }

    /// Rejects out-of-range tuning parameters before the pipeline starts:
    /// a zero template radius or zero context units has no sensible
    /// meaning (there would be no causal neighborhood to estimate from,
    /// or nowhere to put a pixel's mixture parameters).
    pub fn validate(&self) -> Result<()> {
        if self.tp_rad == 0 {
            return crate::helpers::err_exit_code(
                crate::error::PmoExitCode::InvalidConfiguration,
                "tp_rad (template radius) must be >= 1",
            );
        }
        if self.cs_num == 0 {
            return crate::helpers::err_exit_code(
                crate::error::PmoExitCode::InvalidConfiguration,
                "cs_num (number of context units) must be >= 1",
            );
        }
        if self.ex_num + self.pr_num == 0 {
            return crate::helpers::err_exit_code(
                crate::error::PmoExitCode::InvalidConfiguration,
                "ex_num + pr_num (candidate list capacity) must be >= 1",
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(v: &[&str]) -> Vec<std::ffi::OsString> {
        v.iter().map(std::ffi::OsString::from).collect()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::parse(args(&["-i", "in.pgm", "-b", "out.bin"])).unwrap();
        assert_eq!(cfg.ex_win, 80);
        assert_eq!(cfg.ex_num, 64);
        assert_eq!(cfg.pr_win, 10);
        assert_eq!(cfg.pr_num, 25);
        assert_eq!(cfg.cs_num, 16);
        assert_eq!(cfg.tp_rad, 3);
        assert!((cfg.tp_wgt - 0.030).abs() < 1e-12);
        assert!(cfg.is_encoder());
        assert!(!cfg.is_decoder());
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::parse(args(&["-b", "x.bin", "-o", "out.pgm", "--tp_rad", "5"])).unwrap();
        assert_eq!(cfg.tp_rad, 5);
        assert!(cfg.is_decoder());
        assert!(!cfg.is_encoder());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_template_radius() {
        let cfg = Config {
            tp_rad: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_context_units() {
        let cfg = Config {
            cs_num: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_candidate_capacity() {
        let cfg = Config {
            ex_num: 0,
            pr_num: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
