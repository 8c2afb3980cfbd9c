// Copyright (c) 2026 xnu-machtraps Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::TransportError;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub const PIPE_IN_VAR: &str = "RZ_PIPE_IN";
pub const PIPE_OUT_VAR: &str = "RZ_PIPE_OUT";
pub const DYLDCACHE_FILTER_VAR: &str = "RZ_DYLDCACHE_FILTER";

/// A synchronous command channel to rizin: one command out, one response back.
pub trait Transport {
    fn command(&mut self, cmd: &str) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn command(&mut self, cmd: &str) -> Result<String, TransportError> {
        (**self).command(cmd)
    }
}

/// Framing shared by every rizin pipe: commands are newline terminated,
/// responses run up to a NUL byte.
pub struct Channel<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
}

impl<R: Read, W: Write> Channel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    /// Consume one NUL-terminated response without sending anything.
    pub fn read_response(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::with_capacity(4 * 1024);
        let n = self.reader.read_until(b'\0', &mut buf)?;
        if n == 0 || buf.last() != Some(&b'\0') {
            return Err(TransportError::UnexpectedEof);
        }
        buf.pop();
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn send(&mut self, cmd: &str) -> Result<(), TransportError> {
        // A multi-line command would be split into several responses
        let line = cmd.trim().replace('\n', ";");
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<R: Read, W: Write> Transport for Channel<R, W> {
    fn command(&mut self, cmd: &str) -> Result<String, TransportError> {
        self.send(cmd)?;
        self.read_response()
    }
}

/// Transport for a `#!pipe` child of a running rizin session. The parent
/// passes the two pipe ends as file descriptor numbers in the environment.
pub struct PipeTransport {
    channel: Channel<File, File>,
}

impl PipeTransport {
    #[cfg(unix)]
    pub fn from_env() -> Result<Self, TransportError> {
        use std::os::unix::io::FromRawFd;

        let fd_in = descriptor_from_env(PIPE_IN_VAR)?;
        let fd_out = descriptor_from_env(PIPE_OUT_VAR)?;
        // SAFETY: rizin keeps both descriptors open for the lifetime of this
        // process and nothing else in the process owns them.
        let (input, output) = unsafe { (File::from_raw_fd(fd_in), File::from_raw_fd(fd_out)) };
        Ok(Self {
            channel: Channel::new(input, output),
        })
    }

    #[cfg(not(unix))]
    pub fn from_env() -> Result<Self, TransportError> {
        Err(TransportError::NotInSession(PIPE_IN_VAR))
    }
}

impl Transport for PipeTransport {
    fn command(&mut self, cmd: &str) -> Result<String, TransportError> {
        self.channel.command(cmd)
    }
}

#[cfg(unix)]
fn descriptor_from_env(var: &'static str) -> Result<i32, TransportError> {
    let value = std::env::var(var).map_err(|_| TransportError::NotInSession(var))?;
    value
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|fd| *fd >= 0)
        .ok_or(TransportError::BadDescriptor { var, value })
}

/// Options for launching our own rizin instead of attaching to one.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub program: String,
    pub target: PathBuf,
    pub evals: Vec<String>,
    pub dyldcache_filter: Option<String>,
}

/// Transport over the stdin/stdout of a `rizin -q0` child process.
pub struct SpawnTransport {
    child: Child,
    channel: Channel<ChildStdout, ChildStdin>,
}

impl SpawnTransport {
    pub fn spawn(opts: &SpawnOptions) -> Result<Self, TransportError> {
        let mut cmd = Command::new(&opts.program);
        cmd.arg("-q0");
        for eval in &opts.evals {
            cmd.args(["-e", eval.as_str()]);
        }
        cmd.arg(&opts.target);
        if let Some(filter) = &opts.dyldcache_filter {
            cmd.env(DYLDCACHE_FILTER_VAR, filter);
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|error| TransportError::SpawnFailed {
                program: opts.program.clone(),
                error,
            })?;

        let (stdout, stdin) = match (child.stdout.take(), child.stdin.take()) {
            (Some(out), Some(inp)) => (out, inp),
            _ => {
                let _ = child.kill();
                return Err(TransportError::UnexpectedEof);
            }
        };
        let mut channel = Channel::new(stdout, stdin);
        // rizin announces it finished loading with a bare terminator
        channel.read_response()?;
        Ok(Self { child, channel })
    }
}

impl Transport for SpawnTransport {
    fn command(&mut self, cmd: &str) -> Result<String, TransportError> {
        self.channel.command(cmd)
    }
}

impl Drop for SpawnTransport {
    fn drop(&mut self) {
        if self.channel.send("q!").is_err() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn command_is_newline_terminated_and_response_nul_terminated() {
        let mut out = Vec::new();
        {
            let mut ch = Channel::new(Cursor::new(b"0x1000\n\0[]\0".to_vec()), &mut out);
            assert_eq!(ch.command("?v $$").unwrap(), "0x1000\n");
            assert_eq!(ch.command("axtj @ sym._mach_msg").unwrap(), "[]");
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "?v $$\naxtj @ sym._mach_msg\n"
        );
    }

    #[test]
    fn multi_line_command_is_joined() {
        let mut out = Vec::new();
        {
            let mut ch = Channel::new(Cursor::new(b"\0".to_vec()), &mut out);
            ch.command("s 0x10\naei\n").unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "s 0x10;aei\n");
    }

    #[test]
    fn eof_before_terminator_is_an_error() {
        let mut ch = Channel::new(Cursor::new(b"partial".to_vec()), Vec::new());
        assert!(matches!(
            ch.command("pd 1"),
            Err(TransportError::UnexpectedEof)
        ));

        let mut empty = Channel::new(Cursor::new(Vec::new()), Vec::new());
        assert!(matches!(
            empty.command("pd 1"),
            Err(TransportError::UnexpectedEof)
        ));
    }
}
