//! End-to-end firmware update.
//!
//! ```text
//!   load MSBL ──> enter bootloader (reset, then reset + MFIO)
//!                      │
//!                      v
//!   set page count ──> set IV ──> set auth tag ──> erase application
//!                                                       │
//!                      ┌────────────────────────────────┘
//!                      v
//!   write page 0 .. n-1 (progress after each) ──> exit bootloader
//! ```
//!
//! Any failure aborts the sequence. Preparatory failures are reported with
//! the step that failed, page failures with the page index.

use {
    crate::{
        bootloader::Bootloader,
        connection::Transport,
        error::{Error, Result},
        image::msbl::Msbl,
    },
    log::{debug, info, warn},
    std::{fmt, path::Path},
};

/// Preparatory step of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
    /// Entering bootloader mode.
    EnterBootloader,
    /// Announcing the page count.
    SetNumPages,
    /// Loading the nonce.
    SetIv,
    /// Loading the authentication tag.
    SetAuth,
    /// Erasing the application.
    EraseApp,
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EnterBootloader => "Entering bootloader mode",
            Self::SetNumPages => "Setting page count",
            Self::SetIv => "Setting IV",
            Self::SetAuth => "Setting auth bytes",
            Self::EraseApp => "Erasing application",
        })
    }
}

fn step(step: UpdateStep, result: Result<()>) -> Result<()> {
    result.map_err(|source| Error::UpdateStep {
        step,
        source: Box::new(source),
    })
}

fn exit_quietly<T: Transport>(bl: &mut Bootloader<T>) {
    if let Err(e) = bl.exit_bootloader() {
        warn!("Failed to exit bootloader mode: {e}");
    }
}

/// Flash `image` onto the target.
///
/// `progress` is called with `(pages_written, total_pages)` after each page.
/// The host interrupt checker is polled before erasing and before every page;
/// when it fires the target is asked to leave bootloader mode and
/// [`Error::Interrupted`] is returned.
pub fn update_firmware<T, F>(bl: &mut Bootloader<T>, image: &Msbl, mut progress: F) -> Result<()>
where
    T: Transport,
    F: FnMut(usize, usize),
{
    let header = image.header();
    let total = image.page_count();
    info!(
        "Updating {} firmware: {total} pages of {} bytes",
        header.target_name(),
        header.page_size
    );

    step(UpdateStep::EnterBootloader, bl.enter_bootloader_mode())?;
    step(UpdateStep::SetNumPages, bl.set_num_pages(header.num_pages))?;
    step(UpdateStep::SetIv, bl.set_iv(&header.nonce))?;
    step(UpdateStep::SetAuth, bl.set_auth_bytes(&header.auth))?;

    if crate::is_interrupted_requested() {
        warn!("Update interrupted before erase");
        exit_quietly(bl);
        return Err(Error::Interrupted);
    }
    step(UpdateStep::EraseApp, bl.erase_app())?;

    for (index, page) in image
        .pages()
        .enumerate()
    {
        if crate::is_interrupted_requested() {
            warn!("Update interrupted at page {}/{total}", index + 1);
            exit_quietly(bl);
            return Err(Error::Interrupted);
        }

        bl.write_page(page)
            .map_err(|source| Error::PageWrite {
                page: index,
                total,
                source: Box::new(source),
            })?;
        debug!("Flashed page {}/{total}", index + 1);
        progress(index + 1, total);
    }

    exit_quietly(bl);
    info!("Firmware update complete");
    Ok(())
}

/// Load an MSBL file and flash it.
pub fn update_from_file<T, P, F>(bl: &mut Bootloader<T>, path: P, progress: F) -> Result<()>
where
    T: Transport,
    P: AsRef<Path>,
    F: FnMut(usize, usize),
{
    let image = Msbl::from_file(path)?;
    update_firmware(bl, &image, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockTransport;
    use crate::image::msbl::tests::build_msbl;
    use crate::settings::BridgeSettings;

    fn ready_target(transport: &mut MockTransport) {
        // reset low, reset high, SET_MODE
        transport.push_packet(0, &[]);
        transport.push_packet(0, &[]);
        transport.push_response(&[0xAA]);
        // page count, IV, auth, erase
        for _ in 0..4 {
            transport.push_response(&[0xAA]);
        }
    }

    fn page_writes(transport: &MockTransport) -> Vec<u8> {
        transport
            .writes()
            .iter()
            .filter(|w| w.starts_with(&[0x80, 0x04]))
            .map(|w| w[2])
            .collect()
    }

    #[test]
    fn test_update_success() {
        let _guard = crate::interrupt_test_lock();
        crate::test_set_interrupted(false);

        let image = Msbl::from_bytes(build_msbl(3, 16, 16)).unwrap();
        let mut t = MockTransport::new();
        ready_target(&mut t);
        for _ in 0..3 {
            t.push_response(&[0xAA]);
        }
        t.push_response(&[0xAA]);

        let mut bl = Bootloader::new(t, BridgeSettings::default());
        let mut seen = Vec::new();
        update_firmware(&mut bl, &image, |done, total| seen.push((done, total))).unwrap();

        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
        let t = bl.into_transport();
        assert_eq!(page_writes(&t), vec![1, 2, 3]);
        assert_eq!(t.writes()[3], vec![0x80, 0x02, 0x00, 0x03]);
        assert_eq!(&t.writes()[4][2..], &[0x11; 11]);
        assert_eq!(&t.writes()[5][2..], &[0x22; 16]);
        assert_eq!(t.writes()[6], vec![0x80, 0x03]);
        assert_eq!(
            t.writes()
                .last()
                .unwrap(),
            &vec![0x01, 0x00, 0x00]
        );
        assert_eq!(t.pending(), 0);
    }

    #[test]
    fn test_update_stops_at_failing_page() {
        let _guard = crate::interrupt_test_lock();
        crate::test_set_interrupted(false);

        let image = Msbl::from_bytes(build_msbl(3, 16, 16)).unwrap();
        let mut t = MockTransport::new();
        ready_target(&mut t);
        t.push_response(&[0xAA]);
        t.push_response(&[0x81]);

        let mut bl = Bootloader::new(t, BridgeSettings::default());
        let err = update_firmware(&mut bl, &image, |_, _| {}).unwrap_err();

        assert!(matches!(err, Error::PageWrite { page: 1, total: 3, .. }));
        assert_eq!(err.status_code(), 0x81);
        assert!(err.to_string().starts_with("Flashing page 2/3 failed"));
        assert_eq!(page_writes(&bl.into_transport()), vec![1, 2]);
    }

    #[test]
    fn test_update_reports_failing_step() {
        let _guard = crate::interrupt_test_lock();
        crate::test_set_interrupted(false);

        let image = Msbl::from_bytes(build_msbl(1, 16, 16)).unwrap();
        let mut t = MockTransport::new();
        t.push_packet(0, &[]);
        t.push_packet(0, &[]);
        t.push_response(&[0xAA]);
        t.push_response(&[0xAA]);
        t.push_response(&[0x82]);

        let mut bl = Bootloader::new(t, BridgeSettings::default());
        let err = update_firmware(&mut bl, &image, |_, _| {}).unwrap_err();
        assert!(matches!(
            err,
            Error::UpdateStep {
                step: UpdateStep::SetIv,
                ..
            }
        ));
        assert!(page_writes(&bl.into_transport()).is_empty());
    }

    #[test]
    fn test_update_interrupted_before_erase() {
        let _guard = crate::interrupt_test_lock();

        let image = Msbl::from_bytes(build_msbl(2, 16, 16)).unwrap();
        let mut t = MockTransport::new();
        ready_target(&mut t);

        let mut bl = Bootloader::new(t, BridgeSettings::default());
        crate::test_set_interrupted(true);
        let result = update_firmware(&mut bl, &image, |_, _| {});
        crate::test_set_interrupted(false);

        assert!(matches!(result, Err(Error::Interrupted)));
        let t = bl.into_transport();
        assert!(page_writes(&t).is_empty());
        assert!(
            !t.writes()
                .iter()
                .any(|w| w == &vec![0x80, 0x03])
        );
        assert_eq!(
            t.writes()
                .last()
                .unwrap(),
            &vec![0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_update_from_file_rejects_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.bin");
        std::fs::write(&path, build_msbl(1, 16, 16)).unwrap();

        let mut bl = Bootloader::new(MockTransport::new(), BridgeSettings::default());
        let err = update_from_file(&mut bl, &path, |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
        assert!(bl.into_transport().writes().is_empty());
    }
}
