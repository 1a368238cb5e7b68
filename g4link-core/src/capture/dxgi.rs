//! DXGI Desktop Duplication capture for Windows.
//!
//! Uses the Direct3D 11 Desktop Duplication API to read the desktop
//! texture, then crops the requested region on the CPU.
//!
//! # Platform
//!
//! On other platforms the type still exists but [`DxgiCapturer::new`]
//! returns [`LinkError::Capability`].

use crate::capture::{Capturer, crop};
use crate::error::LinkError;
use crate::frame::{RawImage, Region};

/// DXGI-based desktop capturer.
///
/// Wraps the `IDXGIOutputDuplication` pipeline:
///
/// 1. Create a D3D11 device.
/// 2. Enumerate outputs and duplicate the target monitor.
/// 3. Create a CPU-readable staging texture.
/// 4. On each [`grab`](Capturer::grab):
///    - `AcquireNextFrame` (blocks up to `timeout_ms`).
///    - Copy the desktop texture to the staging texture and map it.
///    - Copy only the region rows out of the mapped memory.
///
/// When the compositor reports no new frame within the timeout the
/// previous desktop image is reused, so a static desktop still streams.
pub struct DxgiCapturer {
    /// Desktop width in pixels.
    width: u32,
    /// Desktop height in pixels.
    height: u32,
    /// Acquire timeout in milliseconds.
    timeout_ms: u32,
    /// Last full desktop image, served again when nothing changed.
    last: Option<RawImage>,

    #[cfg(target_os = "windows")]
    device: windows::Win32::Graphics::Direct3D11::ID3D11Device,
    #[cfg(target_os = "windows")]
    context: windows::Win32::Graphics::Direct3D11::ID3D11DeviceContext,
    #[cfg(target_os = "windows")]
    duplication: windows::Win32::Graphics::Dxgi::IDXGIOutputDuplication,
    #[cfg(target_os = "windows")]
    staging_texture: windows::Win32::Graphics::Direct3D11::ID3D11Texture2D,
}

// SAFETY: the COM handles are only touched through `&mut self`, so at most
// one thread uses the immediate context at a time.
#[cfg(target_os = "windows")]
unsafe impl Send for DxgiCapturer {}

impl DxgiCapturer {
    /// Desktop width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Desktop height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    fn desktop(&mut self) -> Result<&RawImage, LinkError> {
        match self.acquire() {
            Ok(img) => self.last = Some(img),
            Err(AcquireError::NoNewFrame) if self.last.is_some() => {}
            Err(AcquireError::NoNewFrame) => {
                return Err(LinkError::Other(format!(
                    "no desktop frame within {} ms",
                    self.timeout_ms
                )));
            }
            Err(AcquireError::Failed(e)) => return Err(e),
        }
        self.last
            .as_ref()
            .ok_or_else(|| LinkError::Other("desktop image missing".into()))
    }
}

impl Capturer for DxgiCapturer {
    fn name(&self) -> &'static str {
        "dxgi"
    }

    fn grab(&mut self, region: Region) -> Result<RawImage, LinkError> {
        region.validate()?;
        let desktop = self.desktop()?;
        crop(desktop, region)
    }
}

enum AcquireError {
    NoNewFrame,
    Failed(LinkError),
}

impl From<LinkError> for AcquireError {
    fn from(e: LinkError) -> Self {
        AcquireError::Failed(e)
    }
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use std::time::Instant;

    use super::*;
    use crate::frame::PixelFormat;
    use windows::{
        Win32::Graphics::{
            Direct3D::D3D_DRIVER_TYPE_HARDWARE,
            Direct3D11::*,
            Dxgi::{Common::*, *},
        },
        core::Interface,
    };

    fn unavailable(what: &str, e: impl std::fmt::Display) -> LinkError {
        LinkError::Capability(format!("{what} failed: {e}"))
    }

    impl DxgiCapturer {
        /// Initialise the capturer for monitor `monitor_index` (0 = primary).
        pub fn new(monitor_index: u32, timeout_ms: u32) -> Result<Self, LinkError> {
            unsafe { Self::init_dxgi(monitor_index, timeout_ms) }
        }

        unsafe fn init_dxgi(monitor_index: u32, timeout_ms: u32) -> Result<Self, LinkError> {
            let mut device = None;
            let mut context = None;
            unsafe {
                D3D11CreateDevice(
                    None,
                    D3D_DRIVER_TYPE_HARDWARE,
                    None,
                    D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                    None,
                    D3D11_SDK_VERSION,
                    Some(&mut device),
                    None,
                    Some(&mut context),
                )
                .map_err(|e| unavailable("D3D11CreateDevice", e))?;
            }
            let device = device.ok_or_else(|| LinkError::Capability("no D3D11 device".into()))?;
            let context =
                context.ok_or_else(|| LinkError::Capability("no D3D11 context".into()))?;

            let dxgi_device: IDXGIDevice =
                device.cast().map_err(|e| unavailable("cast to IDXGIDevice", e))?;
            let adapter = unsafe { dxgi_device.GetAdapter() }
                .map_err(|e| unavailable("GetAdapter", e))?;
            let output: IDXGIOutput = unsafe { adapter.EnumOutputs(monitor_index) }
                .map_err(|e| unavailable(&format!("EnumOutputs({monitor_index})"), e))?;
            let output1: IDXGIOutput1 =
                output.cast().map_err(|e| unavailable("cast to IDXGIOutput1", e))?;
            let duplication = unsafe { output1.DuplicateOutput(&device) }
                .map_err(|e| unavailable("DuplicateOutput", e))?;

            let desc = unsafe { duplication.GetDesc() };
            let width = desc.ModeDesc.Width;
            let height = desc.ModeDesc.Height;

            let staging_desc = D3D11_TEXTURE2D_DESC {
                Width: width,
                Height: height,
                MipLevels: 1,
                ArraySize: 1,
                Format: DXGI_FORMAT_B8G8R8A8_UNORM,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Usage: D3D11_USAGE_STAGING,
                BindFlags: 0,
                CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
                MiscFlags: 0,
            };
            let mut staging_texture = None;
            unsafe {
                device
                    .CreateTexture2D(&staging_desc, None, Some(&mut staging_texture))
                    .map_err(|e| unavailable("CreateTexture2D", e))?;
            }
            let staging_texture = staging_texture
                .ok_or_else(|| LinkError::Capability("no staging texture".into()))?;

            tracing::info!(monitor_index, width, height, "DXGI duplication ready");

            Ok(Self {
                width,
                height,
                timeout_ms,
                last: None,
                device,
                context,
                duplication,
                staging_texture,
            })
        }

        pub(super) fn acquire(&mut self) -> Result<RawImage, AcquireError> {
            unsafe { self.acquire_inner() }
        }

        unsafe fn acquire_inner(&mut self) -> Result<RawImage, AcquireError> {
            let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
            let mut resource = None;

            match unsafe {
                self.duplication
                    .AcquireNextFrame(self.timeout_ms, &mut frame_info, &mut resource)
            } {
                Ok(()) => {}
                Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => {
                    return Err(AcquireError::NoNewFrame);
                }
                Err(e) => return Err(LinkError::Other(format!("AcquireNextFrame: {e}")).into()),
            }

            let resource =
                resource.ok_or_else(|| LinkError::Other("acquired resource is None".into()))?;
            let texture: ID3D11Texture2D = resource.cast().map_err(|e| {
                let _ = unsafe { self.duplication.ReleaseFrame() };
                LinkError::Other(format!("cast to ID3D11Texture2D: {e}"))
            })?;

            unsafe { self.context.CopyResource(&self.staging_texture, &texture) };
            let _ = unsafe { self.duplication.ReleaseFrame() };

            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            unsafe {
                self.context
                    .Map(&self.staging_texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                    .map_err(|e| LinkError::Other(format!("Map: {e}")))?;
            }

            let stride = mapped.RowPitch;
            let total = stride as usize * self.height as usize;
            let data =
                unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, total) }.to_vec();
            unsafe { self.context.Unmap(&self.staging_texture, 0) };

            Ok(RawImage {
                width: self.width,
                height: self.height,
                stride,
                format: PixelFormat::Bgra8,
                data,
                timestamp: Instant::now(),
            })
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl DxgiCapturer {
    /// DXGI is only available on Windows.
    pub fn new(_monitor_index: u32, _timeout_ms: u32) -> Result<Self, LinkError> {
        Err(LinkError::Capability(
            "DXGI Desktop Duplication is only available on Windows".into(),
        ))
    }

    fn acquire(&mut self) -> Result<RawImage, AcquireError> {
        Err(AcquireError::Failed(LinkError::Capability(
            "desktop capture is not supported on this platform".into(),
        )))
    }
}
