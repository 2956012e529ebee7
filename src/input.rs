use anyhow::{bail, Context, Result};
use quest_capture::{Point, ScreenSpace};
use std::process::Command;
use tracing::{debug, info};

/// Synthesises user input at screen-absolute coordinates.
pub trait InputSink: Send + Sync {
    fn move_to(&self, target: Point<ScreenSpace>) -> Result<()>;
    fn click(&self, target: Point<ScreenSpace>) -> Result<()>;
    fn type_text(&self, text: &str) -> Result<()>;
}

/// Logs what would have been done.
pub struct DryRunInput;

impl InputSink for DryRunInput {
    fn move_to(&self, target: Point<ScreenSpace>) -> Result<()> {
        info!("[dry-run] move to {}", target);
        Ok(())
    }

    fn click(&self, target: Point<ScreenSpace>) -> Result<()> {
        info!("[dry-run] click at {}", target);
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        info!("[dry-run] type {:?}", text);
        Ok(())
    }
}

/// Drives the X11 pointer and keyboard through the `xdotool` binary.
pub struct XdotoolInput {
    binary: String,
}

impl XdotoolInput {
    pub fn new() -> Result<Self> {
        let binary = "xdotool".to_string();
        let output = Command::new(&binary)
            .arg("version")
            .output()
            .context("Failed to run xdotool. Install with: apt install xdotool")?;
        if !output.status.success() {
            bail!("xdotool version exited with {}", output.status);
        }
        Ok(Self { binary })
    }

    fn run(&self, args: &[String]) -> Result<()> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {}", self.binary))?;
        if !output.status.success() {
            bail!(
                "{} {} exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl InputSink for XdotoolInput {
    fn move_to(&self, target: Point<ScreenSpace>) -> Result<()> {
        self.run(&move_args(target))
    }

    fn click(&self, target: Point<ScreenSpace>) -> Result<()> {
        let mut args = move_args(target);
        args.extend(["click".to_string(), "1".to_string()]);
        self.run(&args)?;
        info!("Clicked at {}", target);
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.run(&["type".to_string(), "--".to_string(), text.to_string()])
    }
}

fn move_args(target: Point<ScreenSpace>) -> Vec<String> {
    vec![
        "mousemove".to_string(),
        "--sync".to_string(),
        target.x.to_string(),
        target.y.to_string(),
    ]
}
