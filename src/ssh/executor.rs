use async_trait::async_trait;
use bytes::BytesMut;
use russh::ChannelMsg;

use super::{Connection, ConnectionError};
use crate::{
    derive_ext::DeriveExt,
    executor::{Executor, ProcessConfiguration, ProcessError, ProcessOutput},
};

// ssh extended data stream 1 carries stderr
const STDERR_EXT: u32 = 1;

#[async_trait]
impl Executor for Connection {
    async fn execute(&self, process_configuration: &ProcessConfiguration) -> Result<ProcessOutput, ProcessError> {
        let mut channel = match self.open_session_channel().await {
            Ok(channel) => channel,
            Err(ConnectionError::Ssh(err)) => return Err(ProcessError::Channel(err)),
            Err(ConnectionError::Closed(name)) => return Err(ProcessError::ConnectionClosed(name)),
            Err(err) => return Err(ProcessError::Io(err.into())),
        };

        let command = process_configuration.derive_shell_command();
        tracing::debug!(name = %self.name(), %command, "executing remote process");
        channel.exec(true, command).await?;

        let mut stdout = BytesMut::new();
        let mut stderr = BytesMut::new();
        let mut status_code = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } if process_configuration.redirect_stdout => {
                    stdout.extend_from_slice(data);
                }
                ChannelMsg::ExtendedData { ref data, ext } if ext == STDERR_EXT && process_configuration.redirect_stderr => {
                    stderr.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    status_code = Some(i64::from(exit_status));
                }
                _ => {}
            }
        }

        Ok(ProcessOutput {
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            status_code,
        })
    }
}
