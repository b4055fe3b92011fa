// File: ksbot-core/src/drivers/line.rs
//
// Session driver backed by an external helper process that owns the actual
// browser automation. We speak a one-line-request / one-line-reply protocol
// over its stdin/stdout:
//
//   LOGIN <player>   ->  OK | ERR <text>
//   REDEEM <code>    ->  MSG <text> | ERR <text>
//   DISMISS          ->  OK | ERR <text>
//   QUIT             ->  (helper exits)

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::Error;
use ksbot_common::models::{Code, PlayerId};
use ksbot_common::traits::{SessionDriver, SessionEngine};

const QUIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LineSessionDriver {
    program: String,
    args: Vec<String>,
}

impl LineSessionDriver {
    /// `argv[0]` is the helper program, the rest its arguments.
    pub fn new(argv: Vec<String>) -> Result<Self, Error> {
        let mut iter = argv.into_iter();
        let program = iter
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Config("driver command is empty".into()))?;
        Ok(Self {
            program,
            args: iter.collect(),
        })
    }
}

#[async_trait]
impl SessionDriver for LineSessionDriver {
    async fn launch(&self) -> Result<Box<dyn SessionEngine>, Error> {
        info!("Launching session helper: {} {:?}", self.program, self.args);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::EngineUnavailable(format!("{}: {e}", self.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::EngineUnavailable("helper stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::EngineUnavailable("helper stdout not captured".into()))?;

        Ok(Box::new(LineSessionEngine {
            child,
            stdin,
            replies: BufReader::new(stdout).lines(),
            in_flight: false,
        }))
    }
}

struct LineSessionEngine {
    child: Child,
    stdin: ChildStdin,
    replies: Lines<BufReader<ChildStdout>>,
    /// Set while a request awaits its reply. Still set on entry means the
    /// previous call was dropped mid-exchange (e.g. by a timeout) and the
    /// next line on stdout belongs to that call, not to us.
    in_flight: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Ok,
    Msg(String),
    Err(String),
}

fn parse_reply(line: &str) -> Result<Reply, Error> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (tag, rest) = match line.split_once(' ') {
        Some((tag, rest)) => (tag, rest.to_string()),
        None => (line, String::new()),
    };
    match tag {
        "OK" => Ok(Reply::Ok),
        "MSG" => Ok(Reply::Msg(rest)),
        "ERR" => Ok(Reply::Err(rest)),
        other => Err(Error::Driver(format!("unexpected helper reply '{other}'"))),
    }
}

impl LineSessionEngine {
    async fn request(&mut self, line: &str) -> Result<Reply, Error> {
        if self.in_flight {
            return Err(Error::EngineStalled(
                "helper has an unanswered request outstanding".into(),
            ));
        }
        if line.contains(['\n', '\r']) {
            return Err(Error::Driver("request contains a line break".into()));
        }
        self.in_flight = true;
        debug!("helper <= {}", line);
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| Error::Driver(format!("writing to helper: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::Driver(format!("writing to helper: {e}")))?;

        match self.replies.next_line().await {
            Ok(Some(reply)) => {
                debug!("helper => {}", reply);
                let parsed = parse_reply(&reply)?;
                self.in_flight = false;
                Ok(parsed)
            }
            Ok(None) => Err(Error::Driver("helper closed its output".into())),
            Err(e) => Err(Error::Driver(format!("reading from helper: {e}"))),
        }
    }
}

#[async_trait]
impl SessionEngine for LineSessionEngine {
    async fn open_session(&mut self, player: &PlayerId) -> Result<(), Error> {
        match self.request(&format!("LOGIN {player}")).await? {
            Reply::Ok => Ok(()),
            Reply::Err(reason) => Err(Error::SessionOpen {
                player: player.to_string(),
                reason,
            }),
            Reply::Msg(text) => Err(Error::Driver(format!("unexpected MSG to LOGIN: {text}"))),
        }
    }

    async fn submit(&mut self, code: &Code) -> Result<String, Error> {
        match self.request(&format!("REDEEM {code}")).await? {
            Reply::Msg(text) => Ok(text),
            Reply::Err(reason) => Err(Error::Driver(reason)),
            Reply::Ok => Ok(String::new()),
        }
    }

    async fn dismiss_prompt(&mut self) -> Result<(), Error> {
        match self.request("DISMISS").await? {
            Reply::Err(reason) => Err(Error::Driver(reason)),
            Reply::Ok | Reply::Msg(_) => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        if self.in_flight {
            warn!("Session helper is out of sync; killing it");
            return self
                .child
                .kill()
                .await
                .map_err(|e| Error::Driver(format!("killing helper: {e}")));
        }
        // The helper may already be gone; QUIT is best effort.
        let _ = self.stdin.write_all(b"QUIT\n").await;
        let _ = self.stdin.flush().await;

        match timeout(QUIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Session helper exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Driver(format!("waiting for helper: {e}"))),
            Err(_) => {
                warn!("Session helper ignored QUIT; killing it");
                self.child
                    .kill()
                    .await
                    .map_err(|e| Error::Driver(format!("killing helper: {e}")))
            }
        }
    }
}
