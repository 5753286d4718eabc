use super::{IssueState, Tracker, TransportResult};
use crate::error::TransportError;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Tracker backed by the GitHub `gh` CLI. Authentication is whatever `gh`
/// is already logged in with.
#[derive(Debug, Clone)]
pub struct GhTracker {
    gh: PathBuf,
    repo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueView {
    #[serde(default)]
    body: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct PrView {
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct PrListEntry {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "headRefName")]
    head_ref_name: String,
}

impl GhTracker {
    pub fn new(gh: impl Into<PathBuf>, repo: Option<String>) -> Self {
        Self {
            gh: gh.into(),
            repo,
        }
    }

    /// Locate `gh` on `PATH`.
    pub fn discover(repo: Option<String>) -> TransportResult<Self> {
        let gh = which::which("gh").map_err(|e| {
            TransportError::new("discover", "gh", format!("gh CLI not found on PATH: {e}"))
        })?;
        Ok(Self::new(gh, repo))
    }

    fn run(
        &self,
        operation: &str,
        entity: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> TransportResult<String> {
        let err = |message: String| TransportError::new(operation, entity, message);

        let mut cmd = Command::new(&self.gh);
        cmd.args(args);
        if let Some(repo) = &self.repo {
            cmd.args(["--repo", repo.as_str()]);
        }
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(operation, entity, "invoking gh");
        let mut child = cmd.spawn().map_err(|e| err(e.to_string()))?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).map_err(|e| err(e.to_string()))?;
        }
        let output = child.wait_with_output().map_err(|e| err(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(err(format!("gh exited with {}: {}", output.status, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn view_issue(&self, operation: &str, number: u64) -> TransportResult<IssueView> {
        let entity = format!("issue #{number}");
        let n = number.to_string();
        let args = ["issue", "view", &n, "--json", "body,state,labels"];
        let out = self.run(operation, &entity, &args, None)?;
        parse_json(operation, &entity, &out)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    operation: &str,
    entity: &str,
    out: &str,
) -> TransportResult<T> {
    serde_json::from_str(out)
        .map_err(|e| TransportError::new(operation, entity, format!("unexpected gh output: {e}")))
}

fn issue_state(state: &str) -> IssueState {
    if state.eq_ignore_ascii_case("closed") {
        IssueState::Closed
    } else {
        IssueState::Open
    }
}

/// True if `text` contains `id` not followed by another alphanumeric
/// character, so `ARCH-12` does not match `ARCH-120`.
fn mentions_id(text: &str, id: &str) -> bool {
    text.match_indices(id).any(|(pos, _)| {
        !text[pos + id.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

/// Keep only pull requests that name `id` in their title or branch; `gh`
/// search is fuzzy.
fn matching_prs(entries: Vec<PrListEntry>, id: &str) -> Vec<u64> {
    let mut numbers: Vec<u64> = entries
        .into_iter()
        .filter(|pr| mentions_id(&pr.title, id) || mentions_id(&pr.head_ref_name, id))
        .map(|pr| pr.number)
        .collect();
    numbers.sort_unstable();
    numbers
}

impl Tracker for GhTracker {
    fn issue_body(&self, number: u64) -> TransportResult<String> {
        Ok(self.view_issue("issue_body", number)?.body)
    }

    fn set_issue_body(&self, number: u64, body: &str) -> TransportResult<()> {
        let n = number.to_string();
        self.run(
            "set_issue_body",
            &format!("issue #{number}"),
            &["issue", "edit", &n, "--body-file", "-"],
            Some(body),
        )?;
        Ok(())
    }

    fn issue_state(&self, number: u64) -> TransportResult<IssueState> {
        Ok(issue_state(&self.view_issue("issue_state", number)?.state))
    }

    fn issue_labels(&self, number: u64) -> TransportResult<Vec<String>> {
        Ok(self
            .view_issue("issue_labels", number)?
            .labels
            .into_iter()
            .map(|l| l.name)
            .collect())
    }

    fn set_issue_labels(&self, number: u64, labels: &[String]) -> TransportResult<()> {
        let current = self.issue_labels(number)?;
        let add: Vec<&str> = labels
            .iter()
            .filter(|l| !current.contains(l))
            .map(String::as_str)
            .collect();
        let remove: Vec<&str> = current
            .iter()
            .filter(|l| !labels.contains(l))
            .map(String::as_str)
            .collect();
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }

        let n = number.to_string();
        let add = add.join(",");
        let remove = remove.join(",");
        let mut args = vec!["issue", "edit", n.as_str()];
        if !add.is_empty() {
            args.extend(["--add-label", add.as_str()]);
        }
        if !remove.is_empty() {
            args.extend(["--remove-label", remove.as_str()]);
        }
        self.run("set_issue_labels", &format!("issue #{number}"), &args, None)?;
        Ok(())
    }

    fn pr_body(&self, number: u64) -> TransportResult<String> {
        let entity = format!("pull request #{number}");
        let n = number.to_string();
        let out = self.run("pr_body", &entity, &["pr", "view", &n, "--json", "body"], None)?;
        Ok(parse_json::<PrView>("pr_body", &entity, &out)?.body)
    }

    fn set_pr_body(&self, number: u64, body: &str) -> TransportResult<()> {
        let n = number.to_string();
        self.run(
            "set_pr_body",
            &format!("pull request #{number}"),
            &["pr", "edit", &n, "--body-file", "-"],
            Some(body),
        )?;
        Ok(())
    }

    fn open_prs_for_id(&self, id: &str) -> TransportResult<Vec<u64>> {
        let search = format!("{id} in:title");
        let out = self.run(
            "open_prs_for_id",
            id,
            &[
                "pr",
                "list",
                "--state",
                "open",
                "--search",
                &search,
                "--json",
                "number,title,headRefName",
            ],
            None,
        )?;
        let entries: Vec<PrListEntry> = parse_json("open_prs_for_id", id, &out)?;
        Ok(matching_prs(entries, id))
    }
}
