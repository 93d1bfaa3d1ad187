//! Frame sources: the X11 root window and a generated test pattern.

use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, ImageFormat, ImageOrder, Window};
use x11rb::rust_connection::RustConnection;

use spimirror_core::{
    CaptureError, CaptureRegion, ChannelLayout, FrameSource, MemoryFrameSource, SourceFrame,
};

// ── X11Capturer ──────────────────────────────────────────────────

/// How pixels get from the server to us.
enum Transfer {
    /// MIT-SHM: the server writes into a segment sized for the whole
    /// screen, rows packed at `width * 4`.
    #[cfg(target_os = "linux")]
    Shared {
        seg: x11rb::protocol::shm::Seg,
        memory: shm::ShmSegment,
    },
    /// Core `GetImage`: pixels arrive in the reply.
    Copied(Vec<u8>),
}

/// Snapshots the root window in Z-pixmap format.
///
/// Uses MIT-SHM when the server supports it and shares memory with us,
/// otherwise falls back to `GetImage`. Only 32-bit pixmap formats are
/// accepted, which covers depth-24 and depth-32 visuals on every common
/// server.
pub struct X11Capturer {
    conn: RustConnection,
    root: Window,
    width: u32,
    height: u32,
    layout: ChannelLayout,
    transfer: Transfer,
}

impl X11Capturer {
    /// Connect to `display` (`None` or empty uses `$DISPLAY`).
    pub fn connect(display: Option<&str>, layout: ChannelLayout) -> Result<Self, CaptureError> {
        let display = display.filter(|d| !d.is_empty());
        let (conn, screen_num) = x11rb::connect(display)
            .map_err(|e| CaptureError::SurfaceUnavailable(format!("cannot open display: {e}")))?;

        let setup = conn.setup();
        let screen = setup.roots.get(screen_num).ok_or_else(|| {
            CaptureError::SurfaceUnavailable(format!("screen {screen_num} does not exist"))
        })?;

        let bits_per_pixel = setup
            .pixmap_formats
            .iter()
            .find(|f| f.depth == screen.root_depth)
            .map(|f| f.bits_per_pixel)
            .unwrap_or(0);
        if bits_per_pixel != 32 {
            return Err(CaptureError::UnsupportedFormat {
                bits_per_pixel: bits_per_pixel.into(),
            });
        }

        let host_order = if cfg!(target_endian = "little") {
            ImageOrder::LSB_FIRST
        } else {
            ImageOrder::MSB_FIRST
        };
        if setup.image_byte_order != host_order {
            return Err(CaptureError::Failed(
                "server image byte order differs from host".into(),
            ));
        }

        let root = screen.root;
        let (width, height) = (
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        );
        info!("X11 screen {screen_num}: {width}x{height}, depth {}", screen.root_depth);

        let len = width as usize * height as usize * 4;
        let transfer = shared_transfer(&conn, len).unwrap_or_else(|| {
            info!("X11 capture via GetImage");
            Transfer::Copied(Vec::new())
        });

        Ok(Self {
            conn,
            root,
            width,
            height,
            layout,
            transfer,
        })
    }
}

#[cfg(target_os = "linux")]
fn shared_transfer(conn: &RustConnection, len: usize) -> Option<Transfer> {
    match shm::attach(conn, len) {
        Ok((seg, memory)) => {
            info!("X11 capture via MIT-SHM ({len} byte segment)");
            Some(Transfer::Shared { seg, memory })
        }
        Err(e) => {
            info!("MIT-SHM unavailable ({e}); falling back to GetImage");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn shared_transfer(_conn: &RustConnection, _len: usize) -> Option<Transfer> {
    None
}

impl FrameSource for X11Capturer {
    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self, region: CaptureRegion) -> Result<SourceFrame<'_>, CaptureError> {
        if !region.fits_within(self.width, self.height) {
            return Err(CaptureError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                surface_width: self.width,
                surface_height: self.height,
            });
        }

        // X11 coordinates are 16-bit; `fits_within` on a u16-sized screen
        // keeps these casts lossless.
        let (x, y) = (region.x as i16, region.y as i16);
        let (width, height) = (region.width as u16, region.height as u16);

        match &mut self.transfer {
            #[cfg(target_os = "linux")]
            Transfer::Shared { seg, memory } => {
                use x11rb::protocol::shm::ConnectionExt as _;

                let reply = self
                    .conn
                    .shm_get_image(
                        self.root,
                        x,
                        y,
                        width,
                        height,
                        u32::MAX,
                        ImageFormat::Z_PIXMAP.into(),
                        *seg,
                        0,
                    )
                    .map_err(|e| CaptureError::SurfaceUnavailable(e.to_string()))?
                    .reply()
                    .map_err(|e| CaptureError::Failed(format!("ShmGetImage: {e}")))?;

                let stride = region.width * 4;
                let len = stride as usize * region.height as usize;
                if (reply.size as usize) < len {
                    return Err(CaptureError::Failed(format!(
                        "ShmGetImage returned {} bytes, expected {len}",
                        reply.size
                    )));
                }
                SourceFrame::new(
                    region.width,
                    region.height,
                    stride,
                    self.layout,
                    &memory.as_slice()[..len],
                )
            }
            Transfer::Copied(buffer) => {
                let reply = self
                    .conn
                    .get_image(ImageFormat::Z_PIXMAP, self.root, x, y, width, height, u32::MAX)
                    .map_err(|e| CaptureError::SurfaceUnavailable(e.to_string()))?
                    .reply()
                    .map_err(|e| CaptureError::Failed(format!("GetImage: {e}")))?;

                *buffer = reply.data;
                let stride = (buffer.len() / region.height as usize) as u32;
                SourceFrame::new(region.width, region.height, stride, self.layout, buffer)
            }
        }
    }
}

#[cfg(target_os = "linux")]
impl Drop for X11Capturer {
    fn drop(&mut self) {
        if let Transfer::Shared { seg, .. } = self.transfer {
            use x11rb::protocol::shm::ConnectionExt as _;

            if self.conn.shm_detach(seg).is_ok() {
                let _ = self.conn.flush();
            }
        }
    }
}

// ── Shared memory ────────────────────────────────────────────────

#[cfg(target_os = "linux")]
mod shm {
    use std::io;
    use std::ptr;

    use x11rb::connection::Connection;
    use x11rb::protocol::shm::{ConnectionExt as _, Seg};
    use x11rb::rust_connection::RustConnection;

    use spimirror_core::CaptureError;

    /// A private System V shared memory segment, mapped into this process.
    ///
    /// Detached and marked for removal on drop.
    pub struct ShmSegment {
        id: libc::c_int,
        addr: *mut u8,
        len: usize,
    }

    impl ShmSegment {
        pub fn create(len: usize) -> io::Result<Self> {
            // SAFETY: plain syscall; no memory is touched.
            let id = unsafe { libc::shmget(libc::IPC_PRIVATE, len, libc::IPC_CREAT | 0o600) };
            if id < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: `id` is a segment we just created.
            let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
            if addr as isize == -1 {
                let err = io::Error::last_os_error();
                // SAFETY: `id` is ours and nothing is attached.
                unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
                return Err(err);
            }
            Ok(Self {
                id,
                addr: addr.cast(),
                len,
            })
        }

        pub fn id(&self) -> u32 {
            self.id as u32
        }

        pub fn len(&self) -> usize {
            self.len
        }

        pub fn as_slice(&self) -> &[u8] {
            // SAFETY: `addr` maps `len` bytes until drop.
            unsafe { std::slice::from_raw_parts(self.addr, self.len) }
        }

        #[cfg(test)]
        pub fn as_mut_slice(&mut self) -> &mut [u8] {
            // SAFETY: as above; `&mut self` makes the borrow exclusive.
            unsafe { std::slice::from_raw_parts_mut(self.addr, self.len) }
        }
    }

    impl Drop for ShmSegment {
        fn drop(&mut self) {
            // SAFETY: `addr` came from `shmat` and is detached exactly once.
            unsafe {
                libc::shmdt(self.addr.cast());
                libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut());
            }
        }
    }

    /// Create a segment of `len` bytes and attach it to the server.
    pub fn attach(conn: &RustConnection, len: usize) -> Result<(Seg, ShmSegment), CaptureError> {
        let failed = |e: &dyn std::fmt::Display| CaptureError::Failed(e.to_string());

        conn.shm_query_version()
            .map_err(|e| failed(&e))?
            .reply()
            .map_err(|e| failed(&e))?;
        let memory = ShmSegment::create(len).map_err(|e| failed(&format!("shmget: {e}")))?;
        let seg = conn.generate_id().map_err(|e| failed(&e))?;
        conn.shm_attach(seg, memory.id(), false)
            .map_err(|e| failed(&e))?
            .check()
            .map_err(|e| failed(&e))?;
        Ok((seg, memory))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn segment_is_readable_after_write() {
            let mut memory = ShmSegment::create(4096).unwrap();
            assert_eq!(memory.len(), 4096);
            assert!(memory.as_slice().iter().all(|&b| b == 0));

            memory.as_mut_slice()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
            assert_eq!(&memory.as_slice()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        }

        #[test]
        fn zero_sized_segment_rejected() {
            assert!(ShmSegment::create(0).is_err());
        }

        #[test]
        fn dropped_segment_is_removed() {
            let memory = ShmSegment::create(64).unwrap();
            let id = memory.id;
            drop(memory);
            let mut stat = std::mem::MaybeUninit::<libc::shmid_ds>::uninit();
            // SAFETY: IPC_STAT only writes into `stat`.
            let rc = unsafe { libc::shmctl(id, libc::IPC_STAT, stat.as_mut_ptr()) };
            assert_eq!(rc, -1);
        }
    }
}

// ── TestPattern ──────────────────────────────────────────────────

const BARS: [u32; 8] = [
    0x00FF_FFFF,
    0x00FF_FF00,
    0x0000_FFFF,
    0x0000_FF00,
    0x00FF_00FF,
    0x00FF_0000,
    0x0000_00FF,
    0x0000_0000,
];

/// Vertical color bars with a white line sweeping down the surface.
///
/// Every capture moves the line by one row, so each frame produces a
/// two-row dirty rectangle after the first.
pub struct TestPattern {
    surface: MemoryFrameSource,
    width: u32,
    height: u32,
    line: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        let mut surface = MemoryFrameSource::new(width, height, ChannelLayout::XRGB8888);
        for (i, px) in surface.pixels_mut().iter_mut().enumerate() {
            let x = (i as u64 % u64::from(width)) as usize;
            *px = BARS[x * BARS.len() / width as usize];
        }
        Self {
            surface,
            width,
            height,
            line: 0,
        }
    }

    fn bar(&self, x: u32) -> u32 {
        BARS[x as usize * BARS.len() / self.width as usize]
    }

    fn draw_row(&mut self, y: u32, white: bool) {
        for x in 0..self.width {
            let word = if white { 0x00FF_FFFF } else { self.bar(x) };
            self.surface.set(x, y, word);
        }
    }
}

impl FrameSource for TestPattern {
    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self, region: CaptureRegion) -> Result<SourceFrame<'_>, CaptureError> {
        self.draw_row(self.line, false);
        self.line = (self.line + 1) % self.height;
        self.draw_row(self.line, true);
        self.surface.capture(region)
    }
}

// ── Tests ────────────────────────────────────────────────────────
