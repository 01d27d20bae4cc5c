use crossterm::style::Stylize;

use crate::{
    deployment::{artifacts::ArtifactSet, deployment::TargetOutcome},
    error::DeployError,
    serialization::deploy_target::TargetConfig,
    states::deploy_state::{convert_stage_to_str, Stage, StageObserver},
};

/// Prints one progress line per stage.
pub struct ConsoleObserver;

impl StageObserver for ConsoleObserver {
    fn stage_started(&self, target: &str, stage: Stage, detail: &str) {
        println!("{} {}", format!("{}:", target).bold(), convert_stage_to_str(stage, detail).grey());
    }
}

/// Operator report for one target, without styling.
pub fn render_outcome(outcome: &TargetOutcome) -> String {
    let mut lines = Vec::new();
    match &outcome.result {
        Ok(_) => lines.push(format!(
            "Successfully flashed device {} on {}",
            outcome.serial_port, outcome.target
        )),
        Err(DeployError::FlashFailure(result)) => {
            lines.push(format!(
                "Failed to flash device {} on {} (exit code {})",
                outcome.serial_port, outcome.target, result.exit_code
            ));
            lines.push(format!("\t{}", result.command));
            push_captured(&mut lines, "stdout", &result.stdout);
            push_captured(&mut lines, "stderr", &result.stderr);
        }
        Err(DeployError::FlashTimeout { command, timeout }) => {
            lines.push(format!(
                "Flashing device {} on {} did not finish within {:?}, the device may be partially programmed",
                outcome.serial_port, outcome.target, timeout
            ));
            lines.push(format!("\t{}", command));
        }
        Err(e) => lines.push(format!(
            "Deployment to {} failed at stage {}: {}",
            outcome.target,
            e.stage(),
            e
        )),
    }
    lines.join("\n")
}

fn push_captured(lines: &mut Vec<String>, name: &str, text: &str) {
    let text = text.trim_end();
    if text.trim_start().is_empty() {
        return;
    }
    lines.push(format!("--- {} ---", name));
    lines.push(text.to_string());
}

pub fn print_outcome(outcome: &TargetOutcome) {
    let report = render_outcome(outcome);
    if outcome.succeeded() {
        println!("{}", report.green());
    } else {
        println!("{}", report.red());
    }
}

/// Dry run plan: what would be uploaded and the command that would run.
pub fn render_plan(target: &TargetConfig, artifacts: &ArtifactSet, command: &str) -> String {
    let header = format!(
        "{} ({}@{}:{})",
        target.display_name(),
        target.user,
        target.host,
        target.port
    );
    let uploads = artifacts.iter().map(|artifact| {
        format!(
            "\t{} {} -> ~/{}",
            artifact.kind,
            artifact.local_path.display(),
            artifact.remote_path
        )
    });

    std::iter::once(header)
        .chain(uploads)
        .chain(std::iter::once(format!("\tflash: {}", command)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{flash::FlashResult, transport::CommandOutput};
    use crate::serialization::deploy_target::AuthenticationConfig;
    use std::{path::Path, time::Duration};

    fn outcome(result: crate::error::Result<FlashResult>) -> TargetOutcome {
        TargetOutcome {
            target: "garage".into(),
            serial_port: "/dev/ttyACM0".into(),
            result,
        }
    }

    #[test]
    fn success_is_a_single_line() {
        let result = FlashResult::new("avrdude".into(), CommandOutput::default());
        assert_eq!(
            render_outcome(&outcome(Ok(result))),
            "Successfully flashed device /dev/ttyACM0 on garage"
        );
    }

    #[test]
    fn failure_shows_command_and_output() {
        let command = "avrdude -c arduino -p ATMEGA328P -P /dev/ttyACM0 -U flash:w:binaries/N/N.hex";
        let result = FlashResult::new(
            command.into(),
            CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "avrdude: stk500_getsync() attempt 1 of 10: not in sync\n".into(),
            },
        );
        let report = render_outcome(&outcome(result.check()));

        assert!(report.starts_with("Failed to flash device /dev/ttyACM0 on garage (exit code 1)"));
        assert!(report.contains(command));
        assert!(report.contains("avrdude: stk500_getsync() attempt 1 of 10: not in sync"));
        assert!(!report.contains("--- stdout ---"));
    }

    #[test]
    fn failure_report_layout_is_exact() {
        let result = FlashResult::new(
            "avrdude -p m328p".into(),
            CommandOutput {
                exit_code: 1,
                stdout: "Reading | ####\n\n".into(),
                stderr: "avrdude: not in sync\n".into(),
            },
        );
        assert_eq!(
            render_outcome(&outcome(result.check())),
            "Failed to flash device /dev/ttyACM0 on garage (exit code 1)\n\
             \tavrdude -p m328p\n\
             --- stdout ---\n\
             Reading | ####\n\
             --- stderr ---\n\
             avrdude: not in sync"
        );
    }

    #[test]
    fn timeout_warns_about_partial_programming() {
        let report = render_outcome(&outcome(Err(DeployError::FlashTimeout {
            command: "avrdude -U flash:w:x.hex".into(),
            timeout: Duration::from_secs(120),
        })));
        assert!(report.contains("within 120s"));
        assert!(report.contains("partially programmed"));
        assert!(report.contains("avrdude -U flash:w:x.hex"));
    }

    #[test]
    fn other_errors_name_the_stage() {
        let report = render_outcome(&outcome(Err(DeployError::Connection {
            host: "192.168.10.154".into(),
            reason: "connection refused".into(),
        })));
        assert_eq!(
            report,
            "Deployment to garage failed at stage connect: cannot reach 192.168.10.154: connection refused"
        );
    }

    #[test]
    fn plan_lists_artifacts_and_command() {
        let target = TargetConfig {
            name: Some("garage".into()),
            host: "192.168.10.154".into(),
            port: 22,
            user: "pi".into(),
            authentication: AuthenticationConfig::Password { env: "PW".into() },
            board: "ATMEGA328P".into(),
            serial_port: "/dev/ttyACM0".into(),
            host_key_fingerprint: None,
        };
        let artifacts = ArtifactSet::from_platformio(Path::new("build"), "Node", true).unwrap();
        let plan = render_plan(&target, &artifacts, "avrdude -U flash:w:binaries/Node/Node.hex");

        assert!(plan.starts_with("garage (pi@192.168.10.154:22)"));
        assert!(plan.contains("image build/Node/Node.hex -> ~/binaries/Node/Node.hex"));
        assert!(plan.contains("debug symbols build/Node/Node.elf -> ~/binaries/Node/Node.elf"));
        assert!(plan.ends_with("flash: avrdude -U flash:w:binaries/Node/Node.hex"));
        assert_eq!(plan.lines().count(), 4);
    }
}
