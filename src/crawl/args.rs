//! Crawl invocation builder
//!
//! Translates a batch into the full wget-at argument list and environment.
//! The flag set is deliberately rigid: DNS goes through fixed public
//! resolvers with reserved subnets rejected, certificates are not checked,
//! robots.txt is ignored, and the capture is zstd-compressed against the
//! shared dictionary without embedding it. Changing any of it changes
//! [`logic_hash`], which the coordinator uses to spot stale workers.

use std::path::Path;

use crate::config::Config;
use crate::types::{Batch, TargetKind};
use crate::utils::sha1_hex;
use crate::workspace::Workspace;

/// Resolvers used for all crawl DNS lookups (Quad9, IPv4 and IPv6)
const DNS_SERVERS: &str = "9.9.9.10,149.112.112.10,2620:fe::10,2620:fe::fe:10";

/// Hosts the recursive crawl is allowed to stay on
const CRAWL_DOMAINS: &str = "glitch.com";

/// Lookup endpoint seeding a domain target's crawl
const DOMAIN_SEED_PREFIX: &str = "https://api.glitch.com/v1/projects/by/domain?domain=";

/// A fully-prepared crawl process invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationSpec {
    /// Resolved path to the crawl executable
    pub executable: std::path::PathBuf,
    /// Complete argument list, in order
    pub args: Vec<String>,
    /// Environment variables the crawl script reads, in a fixed order
    pub env: Vec<(String, String)>,
}

/// Build the crawl invocation for `batch`
///
/// Pure with respect to its inputs: the same batch, workspace, executable,
/// and configuration always produce the same spec. The dictionary is
/// referenced by its fixed in-workspace path and must be materialized by the
/// caller before the process starts.
#[must_use]
pub fn build_invocation(
    batch: &Batch,
    workspace: &Workspace,
    executable: &Path,
    config: &Config,
) -> InvocationSpec {
    let project = &config.tracker.project;

    let script = config.crawl.script_path.to_string_lossy().into_owned();
    let wget_log = workspace.dir().join("wget.log").to_string_lossy().into_owned();
    let output_document = workspace.dir().join("wget.tmp").to_string_lossy().into_owned();
    let warc_file = workspace
        .dir()
        .join(&batch.capture_base)
        .to_string_lossy()
        .into_owned();
    let zstdict = workspace.dictionary_path().to_string_lossy().into_owned();
    let version_header = format!("x-wget-at-project-version: {}", config.tracker.version);
    let name_header = format!("x-wget-at-project-name: {project}");

    let mut args: Vec<String> = [
        "-U",
        config.crawl.user_agent.as_str(),
        "-nv",
        "--no-cookies",
        "--host-lookups",
        "dns",
        "--hosts-file",
        "/dev/null",
        "--resolvconf-file",
        "/dev/null",
        "--dns-servers",
        DNS_SERVERS,
        "--reject-reserved-subnets",
        "--content-on-error",
        "--lua-script",
        script.as_str(),
        "-o",
        wget_log.as_str(),
        "--no-check-certificate",
        "--output-document",
        output_document.as_str(),
        "--truncate-output",
        "-e",
        "robots=off",
        "--recursive",
        "--level=inf",
        "--no-parent",
        "--page-requisites",
        "--timeout",
        "30",
        "--connect-timeout",
        "1",
        "--tries",
        "inf",
        "--domains",
        CRAWL_DOMAINS,
        "--span-hosts",
        "--waitretry",
        "30",
        "--warc-file",
        warc_file.as_str(),
        "--warc-header",
        "operator: Archive Team",
        "--warc-header",
        version_header.as_str(),
        "--warc-header",
        name_header.as_str(),
        "--warc-dedup-url-agnostic",
        "--warc-compression-use-zstd",
        "--warc-zstd-dict-no-include",
        "--secure-protocol",
        "PFS",
        "--warc-zstd-dict",
        zstdict.as_str(),
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    for target in &batch.targets {
        let name = target.name();
        args.push("--warc-header".to_string());
        args.push(format!("x-wget-at-project-item-name: {name}"));
        args.push(format!("item-name://{name}"));
        match target.kind {
            TargetKind::Domain => {
                args.push("--warc-header".to_string());
                args.push(format!("{project}-domain: {}", target.value));
                args.push(format!("{DOMAIN_SEED_PREFIX}{}", target.value));
            }
            TargetKind::Asset => {
                let url = format!("https://{}", target.value);
                args.push("--warc-header".to_string());
                args.push(format!("{project}-asset: {url}"));
                args.push(url);
            }
        }
    }

    if let Some(addr) = &config.crawl.bind_address {
        args.push("--bind-address".to_string());
        args.push(addr.clone());
    }

    let env = vec![
        (
            "item_dir".to_string(),
            workspace.dir().to_string_lossy().into_owned(),
        ),
        ("item_names".to_string(), batch.newline_joined_names()),
        ("warc_file_base".to_string(), batch.capture_base.clone()),
        (
            "concurrency".to_string(),
            batch.concurrency_hint.to_string(),
        ),
    ];

    InvocationSpec {
        executable: executable.to_path_buf(),
        args,
        env,
    }
}

/// Content hash of this argument-building module
///
/// Reported to the coordinator alongside the crawl script hash so stale
/// workers are detectable server-side.
#[must_use]
pub fn logic_hash() -> String {
    sha1_hex(include_str!("args.rs").as_bytes())
}
