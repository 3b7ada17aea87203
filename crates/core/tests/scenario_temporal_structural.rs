//! End-to-end coverage for the two scenarios that need real commit history:
//! a complex, low-cohesion file with nonzero churn, and a pair of files
//! that always change together without ever importing each other
//! (spec §8 scenarios 2, 4).

use std::fs;
use std::path::Path;

use git2::{Repository, Signature, Time};

use shannon_insight_core::finders::{run_finders, Target};
use shannon_insight_core::{analyze, AnalysisConfig};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Stages every file currently on disk and commits, advancing a fake clock
/// so `revwalk`'s time-sort sees a stable, strictly increasing order.
fn commit_all(repo: &Repository, message: &str, seconds: i64) {
    let mut index = repo.index().unwrap();
    index.add_all(["*"], git2::IndexAddOption::DEFAULT, None).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let time = Time::new(seconds, 0);
    let sig = Signature::new("Test Author", "author@example.com", &time).unwrap();

    let parents: Vec<git2::Commit> = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => vec![],
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs).unwrap();
}

#[test]
fn god_file_and_hidden_coupling_fire_together() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let repo = Repository::init(root).unwrap();

    // mega.rs: twelve functions with disjoint vocabulary (so its own
    // pairwise concept-vector similarity is ~0) and one deeply nested
    // branch (so its cognitive_load dominates everything else in the
    // tree). The filler files below exist only so semantic_coherence has
    // enough other multi-function files to rank mega.rs's near-zero
    // coherence in the bottom 20th percentile instead of being the sole
    // (and therefore 100th-percentile) data point.
    write(
        root,
        "mega.rs",
        "fn parse_json() {}\n\
         fn render_html() {}\n\
         fn compute_tax() {}\n\
         fn send_email() {}\n\
         fn validate_regex() {}\n\
         fn connect_database(n: i32) -> i32 {\n\
         \x20   if n > 0 {\n\
         \x20       if n > 1 {\n\
         \x20           if n > 2 {\n\
         \x20               if n > 3 {\n\
         \x20                   if n > 4 {\n\
         \x20                       if n > 5 {\n\
         \x20                           if n > 6 {\n\
         \x20                               return n * 2;\n\
         \x20                           }\n\
         \x20                       }\n\
         \x20                   }\n\
         \x20               }\n\
         \x20           }\n\
         \x20       }\n\
         \x20   }\n\
         \x20   n\n\
         }\n\
         fn encrypt_password() {}\n\
         fn schedule_job() {}\n\
         fn compress_image() {}\n\
         fn log_event() {}\n\
         fn cache_result() {}\n\
         fn format_currency() {}\n",
    );
    // Each filler file's shared verb covers only two of its three functions
    // (never all of them) so that verb keeps a nonzero IDF weight: a token
    // present in every function of a file cancels out of its own
    // concept-vector cosine, which would otherwise make the file look just
    // as "coherent-to-itself" as mega.rs and collapse the percentile ranking.
    write(root, "parsers.rs", "fn parse_json() {}\nfn parse_xml() {}\nfn validate_schema() {}\n");
    write(root, "validators.rs", "fn validate_email() {}\nfn validate_phone() {}\nfn normalize_address() {}\n");
    write(root, "formatters.rs", "fn format_date() {}\nfn format_percent() {}\nfn round_number() {}\n");
    write(root, "loaders.rs", "fn load_config() {}\nfn load_schema() {}\nfn cache_manifest() {}\n");
    write(root, "exporters.rs", "fn export_csv() {}\nfn export_pdf() {}\nfn compress_archive() {}\n");
    write(root, "noise.rs", "fn touch() {}\n");
    commit_all(&repo, "scaffold", 1_700_000_000);

    // auth.rs and session.rs share no import edge but change together in
    // every commit that touches either of them.
    write(root, "auth.rs", "fn login_user() {}\nfn login_admin() {}\n");
    write(root, "session.rs", "fn create_session() {}\nfn destroy_session() {}\n");
    commit_all(&repo, "add auth and session", 1_700_000_100);

    write(root, "auth.rs", "fn login_user() {}\nfn login_admin() {}\nfn login_guest() {}\n");
    write(root, "session.rs", "fn create_session() {}\nfn destroy_session() {}\nfn renew_session() {}\n");
    commit_all(&repo, "extend auth and session", 1_700_000_200);

    write(root, "auth.rs", "fn login_user() {}\nfn login_admin() {}\nfn login_guest() {}\nfn logout_user() {}\n");
    // "session" covers only three of these four, for the same IDF reason as
    // the filler files above.
    write(root, "session.rs", "fn create_session() {}\nfn destroy_session() {}\nfn renew_session() {}\nfn archive_log() {}\n");
    commit_all(&repo, "more auth and session", 1_700_000_300);

    // Noise commits that touch neither file, diluting the window so the
    // cochange lift (spec GLOSSARY: P(A∩B) / (P(A)*P(B))) clears threshold.
    // These rewrite noise.rs rather than parsers.rs so parsers.rs keeps its
    // three-function final state on disk.
    for i in 0..7 {
        write(root, "noise.rs", &format!("fn touch() {{}}\n// rev {i}\n"));
        commit_all(&repo, &format!("touch up noise {i}"), 1_700_001_000 + i as i64 * 100);
    }

    let cfg = AnalysisConfig::new(root.to_path_buf());
    let (store, report) = analyze(&cfg).expect("analyze should not hit a fatal error");
    assert!(report.fatal.is_none());

    let findings = run_finders(&store, &cfg);

    let god_file = findings.iter().find(|f| f.pattern == "GOD_FILE" && matches!(&f.target, Target::File(p) if p == "mega.rs"));
    assert!(god_file.is_some(), "mega.rs should be flagged as a god file: {findings:?}");

    let hidden_coupling = findings.iter().find(|f| {
        f.pattern == "HIDDEN_COUPLING"
            && matches!(&f.target, Target::FilePair(a, b) if (a == "auth.rs" && b == "session.rs") || (a == "session.rs" && b == "auth.rs"))
    });
    assert!(hidden_coupling.is_some(), "auth.rs/session.rs should be flagged as hidden coupling: {findings:?}");

    let dead_dependency = findings
        .iter()
        .any(|f| f.pattern == "DEAD_DEPENDENCY" && matches!(&f.target, Target::FilePair(a, b) if (a == "auth.rs" || b == "auth.rs") && (a == "session.rs" || b == "session.rs")));
    assert!(!dead_dependency, "auth.rs/session.rs have no import edge, so DEAD_DEPENDENCY can't apply");
}
