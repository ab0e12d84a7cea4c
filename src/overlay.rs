//! Transient effect overlay.
//!
//! A short effect borrows the strip: the current look is backed up, the
//! effect colour is painted, and after [`RESET_DELAY_MS`] the backup is
//! written back. While an overlay is running, triggers are blocked so that
//! nothing else writes the strip and the restore finds what it left.
//!
//! ```text
//!  ┌──────┐ backup  ┌───────────┐ paint  ┌───────────────┐
//!  │ Idle │───────▶ │ BackedUp  │──────▶ │ EffectActive  │
//!  └──────┘         └───────────┘        └───────┬───────┘
//!     ▲                                          │ now - scheduled > RESET_DELAY_MS
//!     └──────────────────── restore ─────────────┘
//! ```

use heapless::Vec;
use log::{debug, error, info, warn};

use crate::app::ports::{LedStrip, Region};
use crate::error::OverlayError;

/// Time an effect stays on before the backup is restored.
pub const RESET_DELAY_MS: u32 = 10_000;
/// Pause between blocking triggers and taking the backup, so that writes
/// already queued by the host land first.
pub const SETTLE_DELAY_MS: u32 = 50;
/// Minimum spacing of job-finished signals.
pub const MIN_JOB_TRIGGER_MS: u32 = 3000;
/// Capacity of the region backup table.
pub const MAX_REGIONS: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlayPhase {
    #[default]
    Idle,
    BackedUp,
    EffectActive,
}

/// RGBW colour of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgbw {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl Rgbw {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const GREEN: Self = Self::new(0, 255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    /// `0xWWRRGGBB`.
    pub const fn packed(self) -> u32 {
        (self.w as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

/// Saved settings of one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionBackup {
    pub mode: u8,
    pub speed: u8,
    pub intensity: u8,
    pub palette: u8,
    pub colors: [u32; 3],
    pub on: bool,
    pub opacity: u8,
    pub custom: [u8; 3],
    pub selected: bool,
    pub has_data: bool,
}

impl RegionBackup {
    pub fn capture<R: Region + ?Sized>(region: &R) -> Self {
        Self {
            mode: region.mode(),
            speed: region.speed(),
            intensity: region.intensity(),
            palette: region.palette(),
            colors: [region.color(0), region.color(1), region.color(2)],
            on: region.is_on(),
            opacity: region.opacity(),
            custom: [region.custom(0), region.custom(1), region.custom(2)],
            selected: region.is_selected(),
            has_data: true,
        }
    }

    /// Write the saved settings back. Effect parameters are only written
    /// when they differ, since a mode write restarts the effect.
    pub fn restore_into<R: Region + ?Sized>(&self, region: &mut R) {
        if region.mode() != self.mode {
            region.set_mode(self.mode);
        }
        if region.palette() != self.palette {
            region.set_palette(self.palette);
        }
        if region.speed() != self.speed {
            region.set_speed(self.speed);
        }
        if region.intensity() != self.intensity {
            region.set_intensity(self.intensity);
        }
        for (slot, color) in self.colors.iter().enumerate() {
            if region.color(slot) != *color {
                region.set_color(slot, *color);
            }
        }
        region.set_on(self.on);
        region.set_opacity(self.opacity);
        for (slot, value) in self.custom.iter().enumerate() {
            region.set_custom(slot, *value);
        }
        region.set_selected(self.selected);
    }
}

/// Saved global primary / secondary colours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalColorBackup {
    pub primary: [u8; 4],
    pub secondary: [u8; 4],
}

/// Backup / paint / restore state of the strip.
#[derive(Debug, Default)]
pub struct EffectOverlay {
    phase: OverlayPhase,
    block_triggers: bool,
    reset_pending: bool,
    reset_scheduled_ms: u32,
    regions: Option<Vec<RegionBackup, MAX_REGIONS>>,
    global: GlobalColorBackup,
    saved_brightness: u8,
}

impl EffectOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the backup table for `region_count` regions.
    pub fn allocate(&mut self, region_count: usize) {
        if region_count > MAX_REGIONS {
            warn!(
                "Overlay: {} regions, only the first {} are backed up",
                region_count, MAX_REGIONS
            );
        }
        let mut table = Vec::new();
        for _ in 0..region_count.min(MAX_REGIONS) {
            let _ = table.push(RegionBackup::default());
        }
        self.regions = Some(table);
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    /// An overlay is running; other triggers must not touch the strip.
    pub fn is_blocking(&self) -> bool {
        self.block_triggers
    }

    pub fn set_blocking(&mut self, block: bool) {
        self.block_triggers = block;
    }

    /// A restore is scheduled.
    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn has_backup(&self) -> bool {
        self.phase != OverlayPhase::Idle
    }

    /// Backed-up settings of region `index`, if captured.
    pub fn region_backup(&self, index: usize) -> Option<&RegionBackup> {
        self.regions
            .as_ref()
            .and_then(|t| t.get(index))
            .filter(|b| b.has_data)
    }

    pub fn saved_brightness(&self) -> u8 {
        self.saved_brightness
    }

    /// Capture global colours, brightness and every active, selected region.
    pub fn backup<S: LedStrip + ?Sized>(&mut self, strip: &S) -> Result<(), OverlayError> {
        if self.phase != OverlayPhase::Idle {
            warn!("Overlay: backup requested while {:?}", self.phase);
            return Err(OverlayError::NotIdle);
        }
        let table = self.regions.get_or_insert_with(|| {
            warn!("Overlay: backup table missing, re-allocating");
            Vec::new()
        });
        table.clear();

        self.saved_brightness = strip.brightness();
        self.global = GlobalColorBackup {
            primary: strip.primary_color(),
            secondary: strip.secondary_color(),
        };

        let mut captured = 0usize;
        for index in 0..strip.region_count().min(MAX_REGIONS) {
            let backup = match strip.region(index) {
                Some(region) if region.is_active() && region.is_selected() => {
                    captured += 1;
                    RegionBackup::capture(region)
                }
                _ => RegionBackup::default(),
            };
            let _ = table.push(backup);
        }

        self.phase = OverlayPhase::BackedUp;
        debug!(
            "Overlay: backed up {} regions, brightness {}",
            captured, self.saved_brightness
        );
        Ok(())
    }

    /// Paint `color` and `mode` on the main region and every active,
    /// selected region, with the host's global effect parameters.
    pub fn paint<S: LedStrip + ?Sized>(&mut self, strip: &mut S, color: Rgbw, mode: u8) {
        let main = strip.main_region_index();
        let (speed, intensity, palette) = (
            strip.effect_speed(),
            strip.effect_intensity(),
            strip.effect_palette(),
        );
        for index in 0..strip.region_count() {
            let Some(region) = strip.region_mut(index) else {
                continue;
            };
            if index != main && !(region.is_active() && region.is_selected()) {
                continue;
            }
            region.set_color(0, color.packed());
            region.set_color(1, 0);
            region.set_color(2, 0);
            region.set_speed(speed);
            region.set_intensity(intensity);
            region.set_palette(palette);
            region.set_mode(mode);
        }
        if self.phase == OverlayPhase::BackedUp {
            self.phase = OverlayPhase::EffectActive;
        }
    }

    /// Arm the restore timer at `now_ms`.
    pub fn schedule_restore(&mut self, now_ms: u32) {
        self.reset_pending = true;
        self.reset_scheduled_ms = now_ms;
    }

    /// The restore timer has run out.
    pub fn restore_due(&self, now_ms: u32) -> bool {
        self.reset_pending && now_ms.wrapping_sub(self.reset_scheduled_ms) > RESET_DELAY_MS
    }

    /// Write the backup back to the strip and return to idle.
    ///
    /// Global colours go first, then each captured region, then brightness.
    /// Returns the restored brightness.
    pub fn restore<S: LedStrip + ?Sized>(&mut self, strip: &mut S) -> Result<u8, OverlayError> {
        if self.phase == OverlayPhase::Idle {
            debug!("Overlay: nothing to restore");
            return Err(OverlayError::NothingToRestore);
        }
        let Some(table) = self.regions.as_mut() else {
            error!("Overlay: backup table lost before restore");
            self.phase = OverlayPhase::Idle;
            return Err(OverlayError::BackupMissing);
        };

        strip.set_primary_color(self.global.primary);
        strip.set_secondary_color(self.global.secondary);

        for (index, backup) in table.iter_mut().enumerate() {
            if !backup.has_data {
                continue;
            }
            if let Some(region) = strip.region_mut(index) {
                backup.restore_into(region);
            }
            backup.has_data = false;
        }

        strip.set_brightness(self.saved_brightness);
        strip.apply_brightness();
        strip.notify_state_changed();

        self.phase = OverlayPhase::Idle;
        info!("Overlay: restored, brightness {}", self.saved_brightness);
        Ok(self.saved_brightness)
    }

    /// Close the cycle: stop the timer and release the trigger block.
    pub fn finish(&mut self) {
        self.reset_pending = false;
        self.block_triggers = false;
    }
}
