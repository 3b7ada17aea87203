//! Import resolution post-pass (spec §4.2), run once the full file index
//! exists. Classifies each `ImportDecl` as resolved-internal,
//! external (stdlib/package-manifest), or phantom (unresolved-non-external).

use std::collections::{BTreeSet, HashMap};

use super::types::ImportDecl;

const STDLIB_MARKERS: &[&str] = &[
    "std::", "core::", "alloc::", // rust
    "os", "sys", "re", "json", "collections", "typing", "itertools", "functools", "pathlib", "asyncio", // python
    "fmt", "strings", "net/http", "encoding/json", // go
    "java.util", "java.io", "java.lang", // java
];

const EXTERNAL_PACKAGE_HINTS: &[&str] = &[
    "react", "lodash", "express", "axios", "numpy", "pandas", "requests", "flask", "django",
    "tokio", "serde", "clap", "rayon",
];

/// Heuristic module-path extraction from a raw import statement line.
fn extract_module_path(source: &str) -> String {
    let s = source.trim();
    if let Some(rest) = s.strip_prefix("from ") {
        return rest.split_whitespace().next().unwrap_or("").to_string();
    }
    if let Some(rest) = s.strip_prefix("import ") {
        return rest
            .trim_end_matches(';')
            .split(|c| c == ' ' || c == '{')
            .next()
            .unwrap_or("")
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
    }
    if let Some(rest) = s.strip_prefix("use ") {
        return rest
            .trim_end_matches(';')
            .split(|c: char| c == '{' || c == ' ')
            .next()
            .unwrap_or("")
            .to_string();
    }
    if let Some(start) = s.find(['"', '\'']) {
        let quote = s.as_bytes()[start] as char;
        if let Some(end) = s[start + 1..].find(quote) {
            return s[start + 1..start + 1 + end].to_string();
        }
    }
    s.to_string()
}

fn looks_external(module_path: &str) -> bool {
    STDLIB_MARKERS.iter().any(|m| module_path.starts_with(m))
        || EXTERNAL_PACKAGE_HINTS.iter().any(|m| module_path.starts_with(m))
        || (!module_path.starts_with('.') && !module_path.contains('/') && !module_path.starts_with("crate::") && !module_path.starts_with("super::") && !module_path.starts_with("self::"))
}

fn candidate_extensions(ext_hint: &str) -> &'static [&'static str] {
    match ext_hint {
        "rs" => &["rs"],
        "py" | "pyi" => &["py"],
        "ts" | "tsx" => &["ts", "tsx", "d.ts"],
        "js" | "jsx" | "mjs" | "cjs" => &["js", "jsx", "mjs"],
        "go" => &["go"],
        _ => &["rs", "py", "ts", "tsx", "js", "go", "java", "c", "h", "cpp"],
    }
}

fn package_initializers(ext_hint: &str) -> &'static [&'static str] {
    match ext_hint {
        "py" | "pyi" => &["__init__.py"],
        "ts" | "tsx" | "js" | "jsx" => &["index.ts", "index.tsx", "index.js"],
        "rs" => &["mod.rs"],
        _ => &[],
    }
}

/// Resolve every file's imports in place against the full set of discovered
/// relative paths. Priority per spec §4.2: exact-with-extension, package
/// initializer, same-directory, deepest common ancestor.
pub fn resolve_imports(files: &mut HashMap<String, Vec<ImportDecl>>, known_paths: &BTreeSet<String>) {
    let by_stem: HashMap<&str, &str> = known_paths
        .iter()
        .map(|p| (p.rsplit_once('.').map(|(s, _)| s).unwrap_or(p.as_str()), p.as_str()))
        .collect();

    let owners: Vec<String> = files.keys().cloned().collect();
    for owner in owners {
        let owner_ext = owner.rsplit_once('.').map(|(_, e)| e).unwrap_or("").to_string();
        let owner_dir = owner.rsplit_once('/').map(|(d, _)| d).unwrap_or("").to_string();
        let Some(decls) = files.get_mut(&owner) else { continue };
        for decl in decls.iter_mut() {
            let module_path = extract_module_path(&decl.source);
            if module_path.is_empty() {
                continue;
            }
            let resolved = resolve_one(&module_path, &owner_dir, &owner_ext, known_paths, &by_stem);
            match resolved {
                Some(path) => decl.resolved_path = Some(path),
                None => {
                    decl.is_external = looks_external(&module_path);
                }
            }
        }
    }
}

fn resolve_one(
    module_path: &str,
    owner_dir: &str,
    owner_ext: &str,
    known_paths: &BTreeSet<String>,
    by_stem: &HashMap<&str, &str>,
) -> Option<String> {
    let cleaned = module_path.trim_start_matches("./").replace("::", "/").replace('.', "/");
    let exts = candidate_extensions(owner_ext);

    // exact-with-extension, relative to owner dir
    for ext in exts {
        let candidate = if owner_dir.is_empty() {
            format!("{cleaned}.{ext}")
        } else {
            format!("{owner_dir}/{cleaned}.{ext}")
        };
        if known_paths.contains(&candidate) {
            return Some(candidate);
        }
    }

    // package initializer
    for init in package_initializers(owner_ext) {
        let candidate = if owner_dir.is_empty() {
            format!("{cleaned}/{init}")
        } else {
            format!("{owner_dir}/{cleaned}/{init}")
        };
        if known_paths.contains(&candidate) {
            return Some(candidate);
        }
    }

    // same-directory by stem
    let stem = cleaned.rsplit('/').next().unwrap_or(&cleaned);
    if let Some(&path) = by_stem.get(stem) {
        return Some(path.to_string());
    }

    // deepest common ancestor: longest known path whose stem matches and
    // whose directory prefix overlaps owner_dir the most
    known_paths
        .iter()
        .filter(|p| p.rsplit_once('.').map(|(s, _)| s.ends_with(stem)).unwrap_or(false))
        .max_by_key(|p| common_prefix_len(p, owner_dir))
        .cloned()
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.split('/').zip(b.split('/')).take_while(|(x, y)| x == y).count()
}
