//! Target-path resolution for the file tools.
//!
//! An explicit path wins, except that paths under the superuser's
//! application directory are remapped into the real user's home when the
//! process is not the superuser (models tend to hard-code `/root/...`).
//! Without a usable path, the write is classified into a usage category
//! and lands in that category's file under `~/.claw/`.

use std::path::{Path, PathBuf};

/// Per-user application directory name, relative to the home directory.
pub const APP_DIR_NAME: &str = ".claw";

/// Home directory of the superuser.
pub const SUPERUSER_HOME: &str = "/root";

/// Category used when nothing else matches.
pub const DEFAULT_USAGE: &str = "inbox";

/// Keyword sets scanned in order; the first category with a hit wins.
const USAGE_KEYWORDS: &[(&str, &[&str])] = &[
    ("tasks", &["todo", "task", "checklist", "action item", "next step"]),
    ("meetings", &["meeting", "agenda", "minutes"]),
    ("journal", &["journal", "diary", "daily log"]),
    ("ideas", &["idea", "brainstorm"]),
    ("notes", &["note", "summary"]),
];

/// Identity of the operating user, as far as path resolution cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserHome {
    pub home: PathBuf,
    pub is_superuser: bool,
}

impl UserHome {
    pub fn new(home: impl Into<PathBuf>, is_superuser: bool) -> Self {
        Self {
            home: home.into(),
            is_superuser,
        }
    }

    /// The real user of this process, from the password database.
    pub fn current() -> Self {
        #[cfg(unix)]
        {
            // SAFETY: getuid has no preconditions and cannot fail.
            let uid = unsafe { libc::getuid() };
            let home = passwd_home(uid)
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            Self::new(home, uid == 0)
        }
        #[cfg(not(unix))]
        {
            Self::new(dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")), false)
        }
    }

    pub fn app_dir(&self) -> PathBuf {
        self.home.join(APP_DIR_NAME)
    }

    /// Rewrite mentions of the superuser's application directory in `text`
    /// to this user's, matching the remap applied to file paths.
    pub fn normalize_mentions(&self, text: &str) -> String {
        let sentinel = format!("{SUPERUSER_HOME}/{APP_DIR_NAME}/");
        if self.is_superuser || !text.contains(&sentinel) {
            return text.to_string();
        }
        text.replace(&sentinel, &format!("{}/", self.app_dir().display()))
    }
}

#[cfg(unix)]
fn passwd_home(uid: libc::uid_t) -> Option<PathBuf> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let mut buf = vec![0 as libc::c_char; 4096];
    // SAFETY: passwd is plain old data; getpwuid_r fills it and points its
    // string fields into `buf`, which outlives every read below.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
        return None;
    }
    let dir = unsafe { CStr::from_ptr(pwd.pw_dir) };
    Some(PathBuf::from(OsStr::from_bytes(dir.to_bytes())))
}

/// Classify free text into a usage category by keyword scan.
pub fn infer_usage(content: &str) -> &'static str {
    let text = content.to_lowercase();
    USAGE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_USAGE)
}

/// Conventional file name for a usage label.
pub fn usage_filename(usage: &str) -> &'static str {
    match usage.trim().to_lowercase().as_str() {
        "task" | "tasks" | "todo" | "checklist" => "tasks.md",
        "meeting" | "meetings" | "minutes" => "meetings.md",
        "journal" | "diary" => "journal.md",
        "idea" | "ideas" => "ideas.md",
        "note" | "notes" | "summary" => "notes.md",
        _ => "inbox.md",
    }
}

fn is_placeholder(raw: &str) -> bool {
    raw.is_empty() || matches!(raw.to_lowercase().as_str(), "none" | "null")
}

fn expand_tilde(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        home.to_path_buf()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}

/// Resolve where a file tool should read or write.
///
/// `usage` is an explicit category; when absent the category is inferred
/// from `content`.
pub fn resolve_path(
    user: &UserHome,
    path: Option<&str>,
    usage: Option<&str>,
    content: Option<&str>,
) -> std::io::Result<PathBuf> {
    let raw = path.map(str::trim).unwrap_or_default();
    if is_placeholder(raw) {
        let usage = usage
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| infer_usage(content.unwrap_or_default()));
        return Ok(user.app_dir().join(usage_filename(usage)));
    }

    let mut resolved = expand_tilde(raw, &user.home);
    if resolved.is_relative() {
        resolved = std::env::current_dir()?.join(resolved);
    }
    Ok(remap_superuser_path(user, resolved))
}

fn remap_superuser_path(user: &UserHome, path: PathBuf) -> PathBuf {
    if user.is_superuser {
        return path;
    }
    let sentinel = Path::new(SUPERUSER_HOME).join(APP_DIR_NAME);
    if !path.starts_with(&sentinel) {
        return path;
    }
    match path.strip_prefix(SUPERUSER_HOME) {
        Ok(suffix) => user.home.join(suffix),
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserHome {
        UserHome::new("/home/alice", false)
    }

    #[test]
    fn reply_mentions_follow_the_remap() {
        assert_eq!(
            user().normalize_mentions("Saved to /root/.claw/tasks.md."),
            "Saved to /home/alice/.claw/tasks.md."
        );
        assert_eq!(user().normalize_mentions("/root/notes.md"), "/root/notes.md");
        let root = UserHome::new("/root", true);
        assert_eq!(root.normalize_mentions("/root/.claw/x"), "/root/.claw/x");
    }

    #[test]
    fn classifier_category_order() {
        assert_eq!(infer_usage("buy milk todo"), "tasks");
        assert_eq!(infer_usage("Agenda for Monday"), "meetings");
        assert_eq!(infer_usage("Dear diary"), "journal");
        assert_eq!(infer_usage("a brainstorm"), "ideas");
        assert_eq!(infer_usage("summary of the call"), "notes");
        assert_eq!(infer_usage("random text"), "inbox");
        // Earlier categories shadow later ones.
        assert_eq!(infer_usage("meeting notes and a task"), "tasks");
        assert_eq!(infer_usage("journal idea"), "journal");
    }

    #[test]
    fn usage_labels_map_to_files() {
        assert_eq!(usage_filename("todo"), "tasks.md");
        assert_eq!(usage_filename(" Minutes "), "meetings.md");
        assert_eq!(usage_filename("diary"), "journal.md");
        assert_eq!(usage_filename("summary"), "notes.md");
        assert_eq!(usage_filename("groceries"), "inbox.md");
    }

    #[test]
    fn missing_path_uses_content_category() {
        let p = resolve_path(&user(), None, None, Some("buy milk todo")).unwrap();
        assert_eq!(p, PathBuf::from("/home/alice/.claw/tasks.md"));
    }

    #[test]
    fn placeholder_path_uses_explicit_usage() {
        let p = resolve_path(&user(), Some("null"), Some("meeting"), Some("todo")).unwrap();
        assert_eq!(p, PathBuf::from("/home/alice/.claw/meetings.md"));
        let p = resolve_path(&user(), Some(" None "), None, None).unwrap();
        assert_eq!(p, PathBuf::from("/home/alice/.claw/inbox.md"));
    }

    #[test]
    fn superuser_tree_remapped_for_regular_user() {
        let p = resolve_path(&user(), Some("/root/.claw/notes.md"), None, None).unwrap();
        assert_eq!(p, PathBuf::from("/home/alice/.claw/notes.md"));
    }

    #[test]
    fn superuser_tree_kept_for_superuser() {
        let root = UserHome::new("/root", true);
        let p = resolve_path(&root, Some("/root/.claw/notes.md"), None, None).unwrap();
        assert_eq!(p, PathBuf::from("/root/.claw/notes.md"));
    }

    #[test]
    fn paths_outside_sentinel_untouched() {
        let p = resolve_path(&user(), Some("/root/other.txt"), None, None).unwrap();
        assert_eq!(p, PathBuf::from("/root/other.txt"));
        let p = resolve_path(&user(), Some("/root/.clawfoo/x"), None, None).unwrap();
        assert_eq!(p, PathBuf::from("/root/.clawfoo/x"));
    }

    #[test]
    fn tilde_expands_to_user_home() {
        let p = resolve_path(&user(), Some("~/docs/a.md"), None, None).unwrap();
        assert_eq!(p, PathBuf::from("/home/alice/docs/a.md"));
    }
}
