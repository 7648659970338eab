//! `Script` ("Other") — run `python3 <path> [use_result_arg]` and capture
//! stdout (`spec.md` §4.5). Script paths are resolved against the process
//! working directory only (`spec.md` §9, open question 2).

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PdError, PdResult};
use crate::measurement::{Measurement, MeasurementContext};
use crate::plan::{MeasuredValue, TestItem};
use crate::resolver::ResolvedParameters;

pub struct ScriptMeasurement;

#[async_trait]
impl Measurement for ScriptMeasurement {
    async fn execute(
        &self,
        item: &TestItem,
        params: &ResolvedParameters,
        ctx: &MeasurementContext,
    ) -> PdResult<MeasuredValue> {
        let script_name = &item.switch_mode;
        let script_path = resolve_script_path(&ctx.scripts_dir, script_name);

        if !script_path.is_file() {
            return Err(PdError::ScriptNotFound(script_path.display().to_string()));
        }

        let mut command = Command::new("python3");
        command.arg(&script_path);
        command.kill_on_drop(true);
        if let Some(use_result) = params.get_string("use_result") {
            command.arg(use_result);
        }

        let child = command
            .output();

        let output = tokio::select! {
            result = child => result.map_err(|e| PdError::ScriptNotFound(e.to_string()))?,
            _ = ctx.cancel.cancelled() => return Err(PdError::Cancelled),
        };

        if !output.status.success() {
            return Err(PdError::ScriptNonZeroExit(output.status.code().unwrap_or(-1)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(parse_output(&stdout))
    }
}

fn resolve_script_path(scripts_dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    let path = std::path::Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        scripts_dir.join(path)
    }
}

/// Output parsing preference: integer > float > string.
fn parse_output(stdout: &str) -> MeasuredValue {
    if stdout.is_empty() {
        return MeasuredValue::Null;
    }
    if let Ok(i) = stdout.parse::<i64>() {
        return MeasuredValue::Number(i as f64);
    }
    if let Ok(f) = stdout.parse::<f64>() {
        if f.is_finite() {
            return MeasuredValue::Number(f);
        }
    }
    MeasuredValue::Text(stdout.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_output_prefers_integer() {
        assert_eq!(parse_output("123"), MeasuredValue::Number(123.0));
    }

    #[test]
    fn parse_output_falls_back_to_float_then_string() {
        assert_eq!(parse_output("1.5"), MeasuredValue::Number(1.5));
        assert_eq!(parse_output("abc"), MeasuredValue::Text("abc".to_string()));
    }

    #[test]
    fn parse_output_empty_is_null() {
        assert_eq!(parse_output(""), MeasuredValue::Null);
    }

    #[test]
    fn relative_script_path_resolves_against_scripts_dir() {
        let dir = std::path::Path::new("/opt/scripts");
        assert_eq!(
            resolve_script_path(dir, "test123.py"),
            std::path::PathBuf::from("/opt/scripts/test123.py")
        );
    }
}
