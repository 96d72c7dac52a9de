//! Firmware flashing front-end
//!
//! Drives the external `dfu-util` binary to reflash the board over USB DFU.
//! The board must already be in its bootloader (see
//! [`ResetCmd::Boot`](crate::commands::ResetCmd)), at which point it
//! enumerates as an STM32 DFU device.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

/// USB vendor:product pair the board's DFU bootloader enumerates with
pub const DFU_DEVICE: &str = "0483:df11";

/// Flash base address the image is written to
pub const FLASH_ADDRESS: &str = "0x08000000";

/// Errors from the flashing front-end
#[derive(Error, Debug)]
pub enum FlashError {
    /// `dfu-util` could not be started
    #[error("failed to run dfu-util: {0}")]
    Spawn(#[from] std::io::Error),

    /// No DFU device appeared within the timeout
    #[error("no DFU device {DFU_DEVICE} found within {0:?}")]
    DeviceNotFound(Duration),

    /// `dfu-util` exited with a failure status
    #[error("dfu-util failed: {0}")]
    DownloadFailed(String),
}

/// Wait until the board's DFU bootloader shows up on the bus
fn wait_for_device(timeout: Duration) -> Result<(), FlashError> {
    let start = Instant::now();
    loop {
        let output = Command::new("dfu-util").arg("-l").output()?;
        let listing = String::from_utf8_lossy(&output.stdout);
        if listing
            .lines()
            .any(|line| line.contains(DFU_DEVICE) && line.contains("Internal Flash"))
        {
            info!("DFU device {} found", DFU_DEVICE);
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(FlashError::DeviceNotFound(timeout));
        }
        std::thread::sleep(Duration::from_millis(250));
    }
}

/// Flash a firmware image onto the board
///
/// Probes for the DFU device within `timeout`, then downloads `image` to
/// [`FLASH_ADDRESS`] and lets the board leave the bootloader. `dfu-util`
/// progress lines are forwarded to the log.
pub fn flash_firmware(image: &Path, timeout: Duration) -> Result<(), FlashError> {
    wait_for_device(timeout)?;

    let mut child = Command::new("dfu-util")
        .arg("-d")
        .arg(DFU_DEVICE)
        .arg("-a")
        .arg("0")
        .arg("-s")
        .arg(format!("{}:leave", FLASH_ADDRESS))
        .arg("-D")
        .arg(image)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if line.contains("Download") || line.to_uppercase().contains("DFU") {
                info!("{}", line.trim());
            } else {
                debug!("{}", line.trim());
            }
        }
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(FlashError::DownloadFailed(status.to_string()));
    }
    info!(image = %image.display(), "firmware download complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_error_display() {
        let err = FlashError::DeviceNotFound(Duration::from_secs(20));
        assert!(err.to_string().contains(DFU_DEVICE));
    }
}
