//! Output policies: which artifacts to persist for a job, and where.

use std::fmt;
use std::path::{is_separator, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One of the artifacts the analysis service produces for a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Report,
    Screenshot,
    DomainGraph,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Report,
        ArtifactKind::Screenshot,
        ArtifactKind::DomainGraph,
    ];

    /// File name this artifact is stored under for the given job id.
    pub fn file_name(&self, job_id: &str) -> String {
        match self {
            ArtifactKind::Report => format!("report_{job_id}.json"),
            ArtifactKind::Screenshot => format!("screenshot_{job_id}.jpg"),
            ArtifactKind::DomainGraph => format!("domain_graph_{job_id}.gif"),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Report => write!(f, "report"),
            ArtifactKind::Screenshot => write!(f, "screenshot"),
            ArtifactKind::DomainGraph => write!(f, "domain_graph"),
        }
    }
}

/// Per-destination selection of artifact kinds and the directory they go to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub report: bool,
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default)]
    pub domain_graph: bool,
}

impl OutputPolicy {
    pub fn wants(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Report => self.report,
            ArtifactKind::Screenshot => self.screenshot,
            ArtifactKind::DomainGraph => self.domain_graph,
        }
    }

    /// Artifact kinds this policy asks for, in a fixed order.
    pub fn kinds(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        ArtifactKind::ALL.into_iter().filter(|k| self.wants(*k))
    }

    /// Resolve [`OutputPolicy::path`] against `cwd`.
    pub fn output_dir(&self, cwd: &Path) -> PathBuf {
        resolve_output_dir(&self.path, cwd)
    }
}

/// Resolve a configured output path.
///
/// A path beginning with a separator is taken as-is; anything else is joined
/// onto `cwd`. Trailing separators are stripped, except for a bare root.
pub fn resolve_output_dir(path: &str, cwd: &Path) -> PathBuf {
    let joined = if path.starts_with(is_separator) {
        path.to_string()
    } else {
        format!("{}/{}", cwd.display(), path)
    };

    let trimmed = joined.trim_end_matches(is_separator);
    if trimmed.is_empty() {
        PathBuf::from(&joined[..1])
    } else {
        PathBuf::from(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_is_kept() {
        let cwd = Path::new("/srv/uqw");
        assert_eq!(resolve_output_dir("/data/out", cwd), PathBuf::from("/data/out"));
        assert_eq!(resolve_output_dir("/data/out/", cwd), PathBuf::from("/data/out"));
    }

    #[test]
    fn relative_path_joins_cwd() {
        let cwd = Path::new("/srv/uqw");
        assert_eq!(resolve_output_dir("out", cwd), PathBuf::from("/srv/uqw/out"));
        assert_eq!(resolve_output_dir("out/reports/", cwd), PathBuf::from("/srv/uqw/out/reports"));
        assert_eq!(resolve_output_dir("", cwd), PathBuf::from("/srv/uqw"));
    }

    #[test]
    fn resolution_is_idempotent() {
        let cwd = Path::new("/srv/uqw");
        for input in ["out", "out/", "/abs/dir/", "/abs"] {
            let once = resolve_output_dir(input, cwd);
            let twice = resolve_output_dir(&once.display().to_string(), cwd);
            assert_eq!(once, twice, "input {input:?}");
        }
    }

    #[test]
    fn root_stays_root() {
        assert_eq!(resolve_output_dir("/", Path::new("/tmp")), PathBuf::from("/"));
    }

    #[test]
    fn kinds_follow_flags() {
        let policy = OutputPolicy {
            enabled: true,
            path: "out".into(),
            report: true,
            screenshot: false,
            domain_graph: true,
        };
        let kinds: Vec<_> = policy.kinds().collect();
        assert_eq!(kinds, vec![ArtifactKind::Report, ArtifactKind::DomainGraph]);
    }

    #[test]
    fn file_names() {
        assert_eq!(ArtifactKind::Report.file_name("abc"), "report_abc.json");
        assert_eq!(ArtifactKind::Screenshot.file_name("abc"), "screenshot_abc.jpg");
        assert_eq!(ArtifactKind::DomainGraph.file_name("abc"), "domain_graph_abc.gif");
    }
}
