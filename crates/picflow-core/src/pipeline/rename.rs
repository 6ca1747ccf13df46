//! Template-based file renaming.
//!
//! Templates mix literal text with `{token}` placeholders:
//!
//! | Token | Value |
//! |---|---|
//! | `{Y}` `{y}` `{m}` `{d}` `{h}` `{i}` `{s}` `{ms}` | local date/time parts |
//! | `{timestamp}` | epoch seconds |
//! | `{md5}` `{md5-16}` `{sha256}` | hex digests |
//! | `{str-10}` `{str-20}` | random alphanumerics |
//! | `{filename}` | source basename without extension |
//! | `{uuid}` | random v4 UUID |
//! | `{localFolder:N}` | last N directory segments of the source |
//!
//! Unknown placeholders are kept literally.

use std::path::Path;

use chrono::{DateTime, Local};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::fetch::{is_url, url_file_name};
use crate::types::Artifact;

use super::hash::{md5_hex, sha256_hex};

const FIXED_TOKENS: &[&str] = &[
    "Y", "y", "m", "d", "h", "i", "s", "ms", "timestamp", "md5", "md5-16", "sha256", "str-10",
    "str-20", "filename", "uuid",
];

const LOCAL_FOLDER_PREFIX: &str = "localFolder:";

/// Whether `template` contains at least one recognized token.
pub fn has_tokens(template: &str) -> bool {
    placeholders(template).any(|(_, _, name)| is_token(name))
}

fn is_token(name: &str) -> bool {
    FIXED_TOKENS.contains(&name) || local_folder_depth(name).is_some()
}

fn local_folder_depth(name: &str) -> Option<usize> {
    name.strip_prefix(LOCAL_FOLDER_PREFIX)?.trim().parse().ok()
}

/// Iterate `(start, end, name)` for every `{name}` in `template`.
fn placeholders(template: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let open = cursor + template.get(cursor..)?.find('{')?;
        let close = open + template[open..].find('}')?;
        cursor = close + 1;
        Some((open, close + 1, &template[open + 1..close]))
    })
}

/// Basename without extension of a path or URL.
pub fn source_stem(path: &str) -> String {
    let name = if is_url(path) {
        url_file_name(path).unwrap_or_default()
    } else {
        Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name)
}

/// Directory segments of the source, outermost first.
fn source_dirs(path: &str) -> Vec<String> {
    let dir_part = if is_url(path) {
        let without_scheme = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
        let no_query = without_scheme.split(['?', '#']).next().unwrap_or("");
        // Drop the host and the file name.
        let mut segments: Vec<&str> = no_query.split('/').skip(1).collect();
        segments.pop();
        segments.join("/")
    } else {
        Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default()
    };
    dir_part
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render `template` for one item and return the new name without extension.
///
/// Hash tokens digest the source basename (without extension), or `source`
/// bytes when given. Without any recognized token `path` is returned as is.
pub fn rename(path: &str, template: &str, index: usize, source: Option<&[u8]>) -> String {
    rename_at(path, template, index, source, Local::now())
}

fn rename_at(
    path: &str,
    template: &str,
    index: usize,
    source: Option<&[u8]>,
    now: DateTime<Local>,
) -> String {
    if !has_tokens(template) {
        return path.to_string();
    }
    let stem = source_stem(path);
    let hash_input: &[u8] = source.unwrap_or(stem.as_bytes());

    let mut out = String::with_capacity(template.len() + 32);
    let mut last = 0;
    for (start, end, name) in placeholders(template) {
        out.push_str(&template[last..start]);
        match token_value(name, path, &stem, hash_input, now) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&template[start..end]),
        }
        last = end;
    }
    out.push_str(&template[last..]);

    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    if collapsed.ends_with('/') {
        collapsed.push_str(&index.to_string());
    }
    collapsed
}

fn token_value(
    name: &str,
    path: &str,
    stem: &str,
    hash_input: &[u8],
    now: DateTime<Local>,
) -> Option<String> {
    let value = match name {
        "Y" => now.format("%Y").to_string(),
        "y" => now.format("%y").to_string(),
        "m" => now.format("%m").to_string(),
        "d" => now.format("%d").to_string(),
        "h" => now.format("%H").to_string(),
        "i" => now.format("%M").to_string(),
        "s" => now.format("%S").to_string(),
        "ms" => format!("{:03}", now.timestamp_subsec_millis()),
        "timestamp" => now.timestamp().to_string(),
        "md5" => md5_hex(hash_input),
        "md5-16" => md5_hex(hash_input)[..16].to_string(),
        "sha256" => sha256_hex(hash_input),
        "str-10" => random_string(10),
        "str-20" => random_string(20),
        "filename" => stem.to_string(),
        "uuid" => uuid::Uuid::new_v4().to_string(),
        other => {
            let depth = local_folder_depth(other)?;
            let dirs = source_dirs(path);
            let skip = dirs.len().saturating_sub(depth);
            dirs[skip..].join("/")
        }
    };
    Some(value)
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Rename every artifact from its resolved source path.
///
/// `raw_paths[i]` is the pre-staging reference of `output[i]`; artifacts
/// without one use their current file name. The extension is kept.
pub fn rename_artifacts(output: &mut [Artifact], raw_paths: &[String], template: &str) {
    if !has_tokens(template) {
        return;
    }
    for (index, artifact) in output.iter_mut().enumerate() {
        let source = raw_paths
            .get(index)
            .cloned()
            .unwrap_or_else(|| artifact.file_name.clone());
        let stem = rename(&source, template, index, None);
        let new_name = format!("{}{}", stem, artifact.extname);
        tracing::debug!("Rename {} -> {}", artifact.file_name, new_name);
        artifact.file_name = new_name;
    }
}
