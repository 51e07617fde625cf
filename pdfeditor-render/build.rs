//! Stages a prebuilt Pdfium shared library for the `pdf` feature.
//!
//! The located library is exported to the crate as `PDFEDITOR_PDFIUM_LIBRARY_PATH`. Failing to
//! fetch one only produces a warning; the binary then binds Pdfium at runtime or falls back to
//! the structure-only viewer.

use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use ureq::{AgentBuilder, Error as UreqError};
use walkdir::WalkDir;
use zip::read::ZipArchive;

const DEFAULT_PDFIUM_VERSION: &str = "7350";
const DEFAULT_RELEASE_PREFIX: &str = "chromium";
const DEFAULT_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";
const KNOBS: &[&str] = &[
    "SKIP_DOWNLOAD",
    "ARCHIVE_PATH",
    "VERSION",
    "RELEASE_TAG",
    "PLATFORM",
    "BASE_URL",
    "FORCE_DOWNLOAD",
];

fn knob(name: &str) -> Option<String> {
    env::var(format!("PDFEDITOR_PDFIUM_{name}"))
        .ok()
        .filter(|value| !value.is_empty())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for name in KNOBS {
        println!("cargo:rerun-if-env-changed=PDFEDITOR_PDFIUM_{name}");
    }
    println!("cargo:rerun-if-env-changed=PDFIUM_DYNAMIC_LIB_PATH");
    println!("cargo:rerun-if-env-changed=PDFIUM_STATIC_LIB_PATH");

    if env::var_os("CARGO_FEATURE_PDF").is_none() || knob("SKIP_DOWNLOAD").is_some() {
        return;
    }
    if env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some()
        || env::var_os("PDFIUM_STATIC_LIB_PATH").is_some()
    {
        return;
    }

    match Staging::from_env().and_then(|staging| staging.provide()) {
        Ok(library) => println!(
            "cargo:rustc-env=PDFEDITOR_PDFIUM_LIBRARY_PATH={}",
            library.display()
        ),
        Err(err) => println!("cargo:warning=Pdfium not staged, runtime binding will be used: {err:#}"),
    }
}

struct Staging {
    root: PathBuf,
    target_os: String,
    platform: String,
}

impl Staging {
    fn from_env() -> Result<Self> {
        let out_dir = env::var("OUT_DIR").context("OUT_DIR not set")?;
        let target_os = env::var("CARGO_CFG_TARGET_OS").context("CARGO_CFG_TARGET_OS not set")?;
        let target_arch =
            env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH not set")?;
        let platform = knob("PLATFORM").unwrap_or_else(|| platform_for(&target_os, &target_arch));
        let root = PathBuf::from(out_dir).join("pdfium");
        fs::create_dir_all(&root).with_context(|| format!("failed to create {root:?}"))?;
        Ok(Self {
            root,
            target_os,
            platform,
        })
    }

    fn provide(&self) -> Result<PathBuf> {
        if let Some(found) = self.find_library() {
            return Ok(found);
        }
        let archive = match knob("ARCHIVE_PATH") {
            Some(path) => PathBuf::from(path),
            None => self.download()?,
        };
        self.unpack(&archive)?;
        self.find_library()
            .ok_or_else(|| anyhow!("no Pdfium library inside {archive:?}"))
    }

    fn library_name(&self) -> &'static str {
        match self.target_os.as_str() {
            "windows" => "pdfium.dll",
            "macos" => "libpdfium.dylib",
            _ => "libpdfium.so",
        }
    }

    fn find_library(&self) -> Option<PathBuf> {
        let wanted = self.library_name();
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_type().is_file() && entry.file_name() == wanted)
            .map(|entry| entry.into_path())
    }

    fn download(&self) -> Result<PathBuf> {
        let version = knob("VERSION").unwrap_or_else(|| DEFAULT_PDFIUM_VERSION.to_owned());
        let tag = knob("RELEASE_TAG")
            .unwrap_or_else(|| format!("{DEFAULT_RELEASE_PREFIX}/{version}"));
        let base = knob("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let cache = self.root.join("downloads");
        fs::create_dir_all(&cache).with_context(|| format!("failed to create {cache:?}"))?;

        let platform = &self.platform;
        let names = [
            format!("pdfium-{platform}.tgz"),
            format!("pdfium-{version}-{platform}.tgz"),
            format!("pdfium-{platform}.zip"),
        ];
        let mut failures = Vec::new();
        for name in names {
            let target = cache.join(&name);
            if target.is_file() && knob("FORCE_DOWNLOAD").is_none() {
                return Ok(target);
            }
            let url = format!(
                "{}/{}/{name}",
                base.trim_end_matches('/'),
                tag.trim_matches('/')
            );
            match fetch(&url, &target) {
                Ok(()) => return Ok(target),
                Err(err) => {
                    let _ = fs::remove_file(&target);
                    failures.push(err.to_string());
                }
            }
        }
        bail!(
            "no Pdfium archive for {platform} ({version}): {}",
            failures.join("; ")
        )
    }

    fn unpack(&self, archive: &Path) -> Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.file_name().is_some_and(|name| name == "downloads") {
                continue;
            }
            let cleared = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            cleared.with_context(|| format!("failed to clear stale {path:?}"))?;
        }

        let file = File::open(archive).with_context(|| format!("failed to open {archive:?}"))?;
        match archive.extension().and_then(|ext| ext.to_str()) {
            Some("tgz" | "gz") => Archive::new(GzDecoder::new(file))
                .unpack(&self.root)
                .with_context(|| format!("failed to unpack {archive:?}")),
            Some("zip") => ZipArchive::new(file)
                .and_then(|mut zip| zip.extract(&self.root))
                .with_context(|| format!("failed to extract {archive:?}")),
            _ => Err(anyhow!("unsupported archive {archive:?}")),
        }
    }
}

fn platform_for(target_os: &str, target_arch: &str) -> String {
    let os = match target_os {
        "macos" => "mac",
        other => other,
    };
    let arch = match target_arch {
        "aarch64" => "arm64",
        "x86_64" => "x64",
        other => other,
    };
    format!("{os}-{arch}")
}

fn fetch(url: &str, destination: &Path) -> Result<()> {
    let agent = AgentBuilder::new()
        .timeout_connect(Duration::from_secs(20))
        .timeout_read(Duration::from_secs(120))
        .build();
    let response = agent.get(url).call().map_err(|err| match err {
        UreqError::Status(code, _) => anyhow!("GET {url} returned HTTP {code}"),
        other => anyhow!("GET {url} failed: {other}"),
    })?;

    let mut file =
        File::create(destination).with_context(|| format!("failed to create {destination:?}"))?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("failed to write {destination:?}"))?;
    file.flush()?;
    Ok(())
}
