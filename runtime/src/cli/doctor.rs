// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;

/// Report whether a usable Chromium binary can be found.
pub async fn run(explicit: Option<&Path>) -> Result<()> {
    println!("feed-relay doctor");
    println!("=================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = match explicit {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            println!("[!!] --chromium-path {} does not exist", p.display());
            None
        }
        None => find_chromium(),
    };
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Install Chrome or pass --chromium-path."),
    }

    println!();
    if chromium.is_some() {
        println!("Status: READY");
        Ok(())
    } else {
        println!("Status: NOT READY");
        anyhow::bail!("no Chromium binary available")
    }
}
