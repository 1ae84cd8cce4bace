//! Uploader: allocate a jingle slot, then program it note by note.
//!
//! Commands go out strictly one at a time and the first failed
//! acknowledgement aborts the upload. Notes already programmed stay on the
//! device; there is no rollback and no resume.

use crate::diagnostics::Diagnostics;
use crate::error::UploadError;
use crate::protocol::{self, Command};
use crate::transport::Transport;
use crate::window::Window;

/// Send `commands` in order, calling `progress(sent, total)` after each one.
pub fn send_commands<T, F>(
    transport: &mut T,
    commands: &[Command],
    mut progress: F,
) -> Result<(), UploadError>
where
    T: Transport + ?Sized,
    F: FnMut(usize, usize),
{
    for (sent, command) in commands.iter().enumerate() {
        let line = command.to_string();
        log::debug!("sending {:?}", line);
        transport
            .send(&line, &command.expected_ack())
            .map_err(|source| UploadError::Protocol {
                command: line,
                source,
            })?;
        progress(sent + 1, commands.len());
    }
    Ok(())
}

/// Encode the window and upload it as jingle `jingle`, refusing
/// configurations that exceed `capacity` bytes before anything is sent.
pub fn upload_jingle<T, F>(
    window: &Window<'_>,
    jingle: u32,
    capacity: usize,
    transport: &mut T,
    diagnostics: &mut Diagnostics,
    progress: F,
) -> Result<usize, UploadError>
where
    T: Transport + ?Sized,
    F: FnMut(usize, usize),
{
    let bytes = window.check_capacity(capacity)?;
    let commands = protocol::encode_jingle(window, jingle, diagnostics)?;
    log::info!(
        "uploading jingle {}: {} commands, {} of {} bytes",
        jingle,
        commands.len(),
        bytes,
        capacity
    );
    send_commands(transport, &commands, progress)?;
    Ok(commands.len())
}
