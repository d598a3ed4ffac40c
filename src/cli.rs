use crate::config::ConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_TICKS: u32 = 60;
const DEFAULT_DT: f32 = 1.0 / 60.0;

/// Arguments of the `kestrel_lua` runner: a script path followed by flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerArgs {
    pub script: PathBuf,
    pub ticks: u32,
    pub dt: f32,
    pub config: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

impl RunnerArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut script = None;
        let mut ticks = DEFAULT_TICKS;
        let mut dt = DEFAULT_DT;
        let mut config = None;
        let mut overrides = ConfigOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw) = iter.next() {
            let arg = raw.as_ref();
            let Some(key) = arg.strip_prefix("--") else {
                if script.is_some() {
                    bail!("Unexpected argument '{arg}'. Only one script path may be given.");
                }
                script = Some(PathBuf::from(arg));
                continue;
            };
            let value = iter.next().ok_or_else(|| anyhow!("Expected a value after '{arg}'"))?.as_ref().to_string();
            match key {
                "ticks" => {
                    ticks = value.parse::<u32>().with_context(|| format!("Invalid ticks '{value}'"))?;
                }
                "dt" => {
                    dt = value.parse::<f32>().with_context(|| format!("Invalid dt '{value}'"))?;
                    if !dt.is_finite() || dt < 0.0 {
                        bail!("Invalid dt '{value}'. Use a non-negative number of seconds.");
                    }
                }
                "config" => config = Some(PathBuf::from(value)),
                "pool-size" => {
                    overrides.pool_size =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid pool-size '{value}'"))?);
                }
                "call-tick" => overrides.call_tick = Some(parse_bool_flag("call-tick", &value)?),
                "gc-interval" => {
                    overrides.gc_interval =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid gc-interval '{value}'"))?);
                }
                _ => bail!(
                    "Unknown flag '{arg}'. Supported flags: --ticks, --dt, --config, --pool-size, --call-tick, --gc-interval."
                ),
            }
        }
        let script = script.ok_or_else(|| anyhow!("Usage: kestrel_lua <script.lua> [--ticks N] [--dt SECONDS]"))?;
        Ok(Self { script, ticks, dt, config, overrides })
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_and_flags() {
        let args = ["app", "demo.lua", "--ticks", "10", "--dt", "0.5", "--call-tick", "off"];
        let parsed = RunnerArgs::parse(args).expect("parse args");
        assert_eq!(parsed.script, PathBuf::from("demo.lua"));
        assert_eq!(parsed.ticks, 10);
        assert_eq!(parsed.dt, 0.5);
        assert_eq!(parsed.overrides.call_tick, Some(false));
        assert!(parsed.config.is_none());
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["app", "--pool-size", "2", "demo.lua", "--pool-size", "4", "--gc-interval", "7"];
        let parsed = RunnerArgs::parse(args).expect("parse args");
        assert_eq!(parsed.overrides.pool_size, Some(4));
        assert_eq!(parsed.overrides.gc_interval, Some(7));
        assert_eq!(parsed.ticks, DEFAULT_TICKS);
    }

    #[test]
    fn missing_script_errors() {
        let err = RunnerArgs::parse(["app", "--ticks", "3"]).unwrap_err();
        assert!(err.to_string().contains("Usage"), "error should print usage: {err}");
    }

    #[test]
    fn missing_value_errors() {
        let err = RunnerArgs::parse(["app", "demo.lua", "--ticks"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_negative_dt() {
        let err = RunnerArgs::parse(["app", "demo.lua", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
        let err = RunnerArgs::parse(["app", "demo.lua", "--dt", "-1"]).unwrap_err();
        assert!(err.to_string().contains("non-negative"), "negative dt should error: {err}");
    }
}
