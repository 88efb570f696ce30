use crate::{EncoderCommand, Result, TranscodeError, TranscoderConfig};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

/// Aborts the wrapped task when dropped, so a cancelled stream never leaves a
/// feeder running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Step<E> {
    Fed(core::result::Result<core::result::Result<u64, E>, JoinError>),
    Read(std::io::Result<usize>),
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    command: EncoderCommand,
    read_chunk_bytes: usize,
}

impl Transcoder {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            command: EncoderCommand::ffmpeg_encode(config),
            read_chunk_bytes: config.read_chunk_bytes.max(1),
        }
    }

    pub fn with_command(command: EncoderCommand, read_chunk_bytes: usize) -> Self {
        Self {
            command,
            read_chunk_bytes: read_chunk_bytes.max(1),
        }
    }

    pub fn command(&self) -> &EncoderCommand {
        &self.command
    }

    /// Encode a live PCM stream, yielding encoder output as soon as it is read.
    ///
    /// A feeder task copies `input` into the encoder's stdin and shuts the
    /// pipe down once `input` ends; this stream reads stdout concurrently until
    /// end-of-file and then reaps the process. An upstream `Err` is passed
    /// through as the final item after the encoder has been killed and reaped.
    /// Dropping the stream aborts the feeder and kills the encoder.
    pub fn transcode<S, E>(&self, input: S) -> impl Stream<Item = Result<Bytes, E>> + Send + 'static
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: From<TranscodeError> + Send + 'static,
    {
        let command = self.command.clone();
        let chunk = self.read_chunk_bytes;

        async_stream::stream! {
            let mut child = match spawn(&command) {
                Ok(child) => child,
                Err(e) => {
                    yield Err(E::from(e));
                    return;
                }
            };
            let (stdin, mut stdout, stderr) =
                match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                    (Some(i), Some(o), Some(e)) => (i, o, e),
                    _ => {
                        reap(&mut child).await;
                        yield Err(E::from(TranscodeError::Task("encoder pipes unavailable".into())));
                        return;
                    }
                };

            let mut stderr_tail = AbortOnDrop(tokio::spawn(drain_stderr(stderr)));
            let mut feeder = AbortOnDrop(tokio::spawn(feed(input, stdin)));
            let mut feeder_done = false;
            let mut buf = vec![0u8; chunk];
            let mut produced = 0usize;

            loop {
                let step = tokio::select! {
                    fed = &mut feeder.0, if !feeder_done => Step::Fed(fed),
                    read = stdout.read(&mut buf) => Step::Read(read),
                };
                match step {
                    Step::Fed(Ok(Ok(fed))) => {
                        feeder_done = true;
                        debug!(bytes = fed, "encoder input closed");
                    }
                    Step::Fed(Ok(Err(e))) => {
                        reap(&mut child).await;
                        yield Err(e);
                        return;
                    }
                    Step::Fed(Err(join)) => {
                        reap(&mut child).await;
                        yield Err(E::from(TranscodeError::Task(join.to_string())));
                        return;
                    }
                    Step::Read(Ok(0)) => break,
                    Step::Read(Ok(n)) => {
                        produced += n;
                        yield Ok(Bytes::copy_from_slice(&buf[..n]));
                    }
                    Step::Read(Err(e)) => {
                        reap(&mut child).await;
                        yield Err(E::from(TranscodeError::Io(e)));
                        return;
                    }
                }
            }

            // stdout is closed; the feeder normally finished long ago.
            if !feeder_done {
                match (&mut feeder.0).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        reap(&mut child).await;
                        yield Err(e);
                        return;
                    }
                    Err(join) => {
                        reap(&mut child).await;
                        yield Err(E::from(TranscodeError::Task(join.to_string())));
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(bytes = produced, "encoder finished");
                }
                Ok(status) => {
                    let stderr = (&mut stderr_tail.0).await.unwrap_or_default();
                    yield Err(E::from(TranscodeError::Exited { status, stderr }));
                }
                Err(e) => {
                    yield Err(E::from(TranscodeError::Io(e)));
                }
            }
        }
    }

    /// Encode a fully assembled PCM buffer in one process call.
    pub async fn transcode_all(&self, pcm: Bytes) -> Result<Bytes> {
        let mut child = spawn(&self.command)?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TranscodeError::Task("encoder stdin unavailable".into()))?;

        // stdout must drain while stdin is written or a large buffer deadlocks.
        let mut writer = AbortOnDrop(tokio::spawn(async move {
            stdin.write_all(&pcm).await?;
            stdin.shutdown().await?;
            Ok::<_, std::io::Error>(())
        }));

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(TranscodeError::Exited {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        (&mut writer.0)
            .await
            .map_err(|e| TranscodeError::Task(e.to_string()))??;

        debug!(bytes = output.stdout.len(), "batch transcode finished");
        Ok(Bytes::from(output.stdout))
    }
}

fn spawn(command: &EncoderCommand) -> Result<Child> {
    Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TranscodeError::Spawn {
            program: command.program.clone(),
            source,
        })
}

/// Kill (if still running) and wait, so no zombie is left behind.
async fn reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("encoder already exited: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("failed to reap encoder: {}", e);
    }
}

async fn feed<S, E>(input: S, mut stdin: ChildStdin) -> Result<u64, E>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: From<TranscodeError>,
{
    let mut input = std::pin::pin!(input);
    let mut total = 0u64;
    while let Some(item) = input.next().await {
        let chunk = item?;
        // write_all suspends while the pipe is full
        stdin
            .write_all(&chunk)
            .await
            .map_err(|e| E::from(TranscodeError::Io(e)))?;
        total += chunk.len() as u64;
    }
    stdin
        .shutdown()
        .await
        .map_err(|e| E::from(TranscodeError::Io(e)))?;
    drop(stdin);
    Ok(total)
}

/// Forward encoder diagnostics to the log and keep the last line for errors.
async fn drain_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut last = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "encoder", "{}", line);
        last = line;
    }
    last
}
