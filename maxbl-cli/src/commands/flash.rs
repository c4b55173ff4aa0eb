//! Flash, erase, and key loading command implementations.

use {
    crate::{Cli, config::Config, open_session, use_fancy_output},
    anyhow::{Context, Result},
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    maxbl::{AesKeyFile, Msbl, update_firmware},
    std::path::Path,
};

/// Percentage of pages written.
fn percent(done: usize, total: usize) -> u64 {
    if total == 0 {
        return 100;
    }
    u64::try_from(done * 100 / total).unwrap_or(100)
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &Config, firmware: &Path, verify_crc: bool) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware: {}",
            style("📦").cyan(),
            firmware.display()
        );
    }

    let image = Msbl::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;

    if verify_crc {
        image
            .verify_crc()
            .context("CRC verification failed")?;
        if !cli.quiet {
            eprintln!("{} CRC32 verified", style("✓").green());
        }
    }

    let header = image.header();
    if !cli.quiet {
        eprintln!(
            "{} {} image, {} pages of {} bytes",
            style("ℹ").blue(),
            header.target_name(),
            header.num_pages,
            header.page_size
        );
    }

    let mut bl = open_session(cli, config)?;

    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };
    pb.set_message("Preparing target");

    let result = update_firmware(&mut bl, &image, |done, total| {
        pb.set_message(format!("Page {done}/{total}"));
        pb.set_position(percent(done, total));
    });

    match result {
        Ok(()) => pb.finish_with_message("Complete"),
        Err(e) => {
            pb.abandon();
            return Err(e.into());
        },
    }

    if !cli.quiet {
        eprintln!("\n{} Flashing completed", style("🎉").green().bold());
    }
    Ok(())
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &Config) -> Result<()> {
    let mut bl = open_session(cli, config)?;

    if !cli.quiet {
        eprintln!("{} Erasing application...", style("🗑").red());
    }
    bl.erase_app()?;

    if !cli.quiet {
        eprintln!("{} Application erased", style("✓").green().bold());
    }
    Ok(())
}

/// Load-key command implementation.
pub(crate) fn cmd_load_key(cli: &Cli, config: &Config, key_file: &Path) -> Result<()> {
    let keys = AesKeyFile::from_file(key_file)
        .with_context(|| format!("Failed to read key file {}", key_file.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Loaded {}-byte key and {}-byte AAD",
            style("🔑").cyan(),
            keys.key
                .len(),
            keys.aad
                .len()
        );
    }

    let mut bl = open_session(cli, config)?;
    bl.load_aes_key(&keys.key, &keys.aad)?;

    if !cli.quiet {
        eprintln!("{} AES key loaded", style("✓").green().bold());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 4), 0);
        assert_eq!(percent(1, 4), 25);
        assert_eq!(percent(4, 4), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
