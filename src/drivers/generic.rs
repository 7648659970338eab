//! A single driver implementation that dispatches I/O by `Connection`
//! variant: subprocess for `console`, serial for `comport`/`Serial`, TCP
//! for `tcpip`/`Tcpip`, and a VISA/GPIB transport gated behind
//! `instrument_visa`.
//!
//! Grounded on the teacher's `hardware::registry::instantiate_device`
//! match-over-`DriverType` pattern, with the feature-gated
//! not-enabled-at-compile-time branches handled the same way.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::driver::{Driver, DriverOp, DriverValue, NO_INSTRUMENT_FOUND};
use crate::error::{PdError, PdResult};
use crate::registry::Connection;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);

pub struct GenericDriver {
    connection: Connection,
}

impl GenericDriver {
    pub fn new(connection: Connection) -> Self {
        GenericDriver { connection }
    }

    async fn send_raw(&self, command: &str, timeout: Duration) -> PdResult<String> {
        let fut = self.send_raw_inner(command);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PdError::Timeout(format!(
                "timeout after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn send_raw_inner(&self, command: &str) -> PdResult<String> {
        match &self.connection {
            Connection::Local { scheme } if scheme == "console" => run_console(command).await,
            Connection::Local { scheme } if scheme == "comport" => {
                run_serial("/dev/null", 9600, command).await
            }
            Connection::Local { scheme } if scheme == "tcpip" => {
                run_tcpip("127.0.0.1:0", command).await
            }
            Connection::Local { .. } => run_console(command).await,
            Connection::Serial { port, baud, .. } => run_serial(port, *baud, command).await,
            Connection::Tcpip { host, port } => run_tcpip(&format!("{host}:{port}"), command).await,
            Connection::Visa { address } => run_visa(address, command).await,
            Connection::Gpib { board, address } => {
                run_visa(&format!("GPIB{board}::{address}::INSTR"), command).await
            }
            Connection::Ssh { .. } => Err(PdError::DriverIo(
                "SSH transport is not implemented in this build".into(),
            )),
        }
    }
}

#[async_trait]
impl Driver for GenericDriver {
    async fn initialize(&self) -> PdResult<()> {
        Ok(())
    }

    async fn reset(&self) -> PdResult<()> {
        Ok(())
    }

    async fn execute_command(&self, op: DriverOp) -> PdResult<DriverValue> {
        match op {
            DriverOp::SetOutput {
                channel,
                set_volt,
                set_curr,
                ..
            } => {
                let cmd = format!("SET:CH{channel}:VOLT {set_volt}:CURR {set_curr}");
                let response = self.send_raw(&cmd, DEFAULT_COMMAND_TIMEOUT).await?;
                match response.trim().parse::<f64>() {
                    Ok(v) => Ok(DriverValue::Number(v)),
                    Err(_) if response.trim().is_empty() => {
                        Ok(DriverValue::Number(set_volt))
                    }
                    Err(_) => Ok(DriverValue::Text(response)),
                }
            }
            DriverOp::ReadScalar { channel, item, kind } => {
                let cmd = format!("READ:CH{channel}:{item}:{kind}?");
                let response = self.send_raw(&cmd, DEFAULT_COMMAND_TIMEOUT).await?;
                if response.trim().is_empty() {
                    return Ok(DriverValue::Text(NO_INSTRUMENT_FOUND.to_string()));
                }
                match response.trim().parse::<f64>() {
                    Ok(v) => Ok(DriverValue::Number(v)),
                    Err(_) => Ok(DriverValue::Text(response)),
                }
            }
            DriverOp::SendCommand {
                command,
                response_line_count: _,
            } => {
                let response = self.send_raw(&command, DEFAULT_COMMAND_TIMEOUT).await?;
                if response.is_empty() {
                    Ok(DriverValue::Text(NO_INSTRUMENT_FOUND.to_string()))
                } else {
                    Ok(DriverValue::Text(response))
                }
            }
            DriverOp::SetRelay { name, on } => {
                let cmd = format!("RELAY:{name}:{}", if on { "ON" } else { "OFF" });
                self.send_raw(&cmd, DEFAULT_COMMAND_TIMEOUT).await?;
                Ok(DriverValue::Text(if on { "ON" } else { "OFF" }.to_string()))
            }
        }
    }

    async fn close(&self) -> PdResult<()> {
        Ok(())
    }
}

async fn run_console(command: &str) -> PdResult<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| PdError::DriverIo(e.to_string()))?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(feature = "instrument_serial")]
async fn run_serial(port: &str, baud: u32, command: &str) -> PdResult<String> {
    use tokio_serial::SerialPortBuilderExt;
    let mut stream = tokio_serial::new(port, baud)
        .open_native_async()
        .map_err(|e| PdError::DriverIo(e.to_string()))?;
    stream
        .write_all(format!("{command}\n").as_bytes())
        .await
        .map_err(|e| PdError::DriverIo(e.to_string()))?;
    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| PdError::DriverIo(e.to_string()))?;
    Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string())
}

#[cfg(not(feature = "instrument_serial"))]
async fn run_serial(_port: &str, _baud: u32, _command: &str) -> PdResult<String> {
    Err(PdError::DriverIo(
        "serial support not enabled. Rebuild with --features instrument_serial".into(),
    ))
}

async fn run_tcpip(addr: &str, command: &str) -> PdResult<String> {
    use tokio::net::TcpStream;
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PdError::ConnectionFailed(addr.to_string(), e.to_string()))?;
    stream
        .write_all(format!("{command}\n").as_bytes())
        .await
        .map_err(|e| PdError::DriverIo(e.to_string()))?;
    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| PdError::DriverIo(e.to_string()))?;
    Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string())
}

#[cfg(feature = "instrument_visa")]
async fn run_visa(address: &str, command: &str) -> PdResult<String> {
    tokio::task::block_in_place(|| {
        use visa_rs::flags::AccessMode;
        use visa_rs::DefaultRM;
        use std::time::Duration as StdDuration;

        let rm = DefaultRM::new().map_err(|e| PdError::DriverIo(e.to_string()))?;
        let instr = rm
            .open(
                &address.parse().map_err(|_| PdError::ConnectionFailed(address.to_string(), "invalid VISA address".into()))?,
                AccessMode::NO_LOCK,
                StdDuration::from_secs(1),
            )
            .map_err(|e| PdError::ConnectionFailed(address.to_string(), e.to_string()))?;
        instr
            .write_all(command.as_bytes())
            .map_err(|e| PdError::DriverIo(e.to_string()))?;
        let mut buf = [0u8; 4096];
        let n = instr
            .read(&mut buf)
            .map_err(|e| PdError::DriverIo(e.to_string()))?;
        Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string())
    })
}

#[cfg(not(feature = "instrument_visa"))]
async fn run_visa(_address: &str, _command: &str) -> PdResult<String> {
    Err(PdError::DriverIo(
        "VISA support not enabled. Rebuild with --features instrument_visa".into(),
    ))
}
