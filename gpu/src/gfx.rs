// SPDX-License-Identifier: MPL-2.0

//! The wgpu-backed renderer.
//!
//! One renderer type serves every host API; [`Api`] picks which one wgpu drives. Guest surfaces
//! become host textures on first use and stay cached, keyed by guest address and shape, until a
//! flush covering their memory evicts them or the cache fills up.

mod format;

use std::{collections::HashMap, fmt};

use latte_gx2::{self as gx2, SurfaceUse};
// This is usually a bad idea, but we use *so many* WGPU imports that it would be inconvenient
// otherwise.
use wgpu::*;

use crate::backend::{self, Draw, Flush};

/// The most host textures kept alive for guest surfaces at once.
const MAX_CACHED_TEXTURES: usize = 256;

/// The host graphics API a [`Renderer`] runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Api {
    Vulkan,
    OpenGl,
    Dx12,
}

impl Api {
    pub fn backends(self) -> Backends {
        match self {
            Self::Vulkan => Backends::VULKAN,
            Self::OpenGl => Backends::GL,
            Self::Dx12 => Backends::DX12,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vulkan => "vulkan",
            Self::OpenGl => "opengl",
            Self::Dx12 => "dx12",
        }
    }
}

#[derive(Debug)]
pub enum Error {
    NoCompatibleAdapterFound,
    NoCompatibleDeviceFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCompatibleAdapterFound => f.write_str("no compatible graphics adapter found"),
            Self::NoCompatibleDeviceFound => f.write_str("no compatible graphics device found"),
        }
    }
}

impl std::error::Error for Error {}

/// Identifies a host texture created for a guest surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ResourceKey {
    image: u32,
    width: u32,
    height: u32,
    depth: u32,
    mip_count: u32,
    format: TextureFormat,
    dimension: TextureDimension,
}

#[derive(Debug)]
struct CachedTexture {
    texture: Texture,
    /// The number of guest bytes backing the texture, starting at the key's image address.
    image_size: u32,
    /// The value of `Renderer::uses` when the texture was last bound.
    last_used: u64,
}

/// Renders guest command streams through wgpu.
#[derive(Debug)]
pub struct Renderer {
    api: Api,
    device: Device,
    queue: Queue,
    /// Open while the current buffer has recorded work.
    encoder: Option<CommandEncoder>,
    /// Whether error scopes for the current buffer are pushed.
    in_scope: bool,
    textures: HashMap<ResourceKey, CachedTexture>,
    /// Counts texture lookups; orders cache entries by recency.
    uses: u64,
    color_buffers: HashMap<u32, TextureView>,
    pixel_textures: HashMap<u32, TextureView>,
    pending_draws: u64,
    frames: u64,
}

impl Renderer {
    /// Creates a renderer on the first adapter `api` offers.
    pub async fn new(api: Api) -> Result<Self, Error> {
        let adapter = Self::create_adapter(api).await?;
        let (device, queue) = Self::create_device_and_queue(&adapter).await?;

        let info = adapter.get_info();
        tracing::info!("{} renderer on {} ({:?})", api.name(), info.name, info.device_type);

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            tracing::error!("uncaptured graphics error: {}", e);
        }));

        Ok(Self {
            api,
            device,
            queue,
            encoder: None,
            in_scope: false,
            textures: HashMap::new(),
            uses: 0,
            color_buffers: HashMap::new(),
            pixel_textures: HashMap::new(),
            pending_draws: 0,
            frames: 0,
        })
    }

    /// Like [`new`](Self::new), for callers outside an async context.
    pub fn new_blocking(api: Api) -> Result<Self, Error> {
        pollster::block_on(Self::new(api))
    }

    async fn create_adapter(api: Api) -> Result<Adapter, Error> {
        let instance = Instance::new(InstanceDescriptor {
            backends: api.backends(),
            ..Default::default()
        });

        instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            ..Default::default()
        })
        .await
        .ok_or(Error::NoCompatibleAdapterFound)
    }

    /// Creates handles to the logical graphics device as well as the command buffer queue.
    async fn create_device_and_queue(adapter: &Adapter) -> Result<(Device, Queue), Error> {
        adapter.request_device(
            &DeviceDescriptor {
                label: Some("latte"),
                required_features: adapter.features() & Features::TEXTURE_COMPRESSION_BC,
                required_limits: adapter.limits(),
            },
            None,
        )
        .await
        .map_err(|_| Error::NoCompatibleDeviceFound)
    }

    pub fn api(&self) -> Api {
        self.api
    }

    /// The number of frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn begin_scope(&mut self) {
        if !self.in_scope {
            self.device.push_error_scope(ErrorFilter::OutOfMemory);
            self.device.push_error_scope(ErrorFilter::Validation);
            self.in_scope = true;
        }
    }

    fn encoder(&mut self) -> &mut CommandEncoder {
        self.begin_scope();
        let device = &self.device;

        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&CommandEncoderDescriptor { label: Some("buffer") })
        })
    }

    /// Finds or creates the host texture for `surface`.
    fn texture_for(&mut self, surface: &gx2::Surface) -> Result<&Texture, backend::Error> {
        surface.validate()?;
        let dim = surface.dim()?;
        let format = format::texture_format(surface.format()).ok_or_else(|| {
            backend::Error::Unsupported(format!("surface format {:?}", surface.format()))
        })?;
        if format.required_features() != Features::empty()
            && !self.device.features().contains(format.required_features())
        {
            return Err(backend::Error::Unsupported(format!("{:?} on this device", format)));
        }

        let key = ResourceKey {
            image: surface.image.get(),
            width: surface.width.get(),
            height: surface.height.get(),
            depth: surface.slice_count(),
            mip_count: surface.mip_count(),
            format,
            dimension: format::texture_dimension(dim),
        };

        self.uses += 1;
        let uses = self.uses;
        if !self.textures.contains_key(&key) {
            self.begin_scope();
            let texture = Self::create_texture(&self.device, &key)?;
            if self.textures.len() >= MAX_CACHED_TEXTURES {
                let oldest = least_recently_used(
                    self.textures.iter().map(|(key, cached)| (*key, cached.last_used)),
                );
                if let Some(oldest) = oldest {
                    tracing::trace!("evicting texture for {:#010x}", oldest.image);
                    self.textures.remove(&oldest);
                }
            }
            self.textures.insert(
                key,
                CachedTexture { texture, image_size: surface.image_size.get(), last_used: uses },
            );
        }

        match self.textures.get_mut(&key) {
            Some(cached) => {
                cached.last_used = uses;
                Ok(&cached.texture)
            }
            None => Err(backend::Error::Unsupported(format!("texture for {:?}", key))),
        }
    }

    /// Creates the texture `key` describes. A texture the device rejects is never returned.
    fn create_texture(device: &Device, key: &ResourceKey) -> Result<Texture, backend::Error> {
        tracing::debug!("creating texture for {:#010x}: {:?}", key.image, key);

        device.push_error_scope(ErrorFilter::Validation);
        let texture = device.create_texture(&TextureDescriptor {
            label: None,
            size: Extent3d {
                width: key.width,
                height: key.height,
                depth_or_array_layers: key.depth,
            },
            mip_level_count: key.mip_count,
            sample_count: 1,
            dimension: key.dimension,
            format: key.format,
            usage: texture_usage(key.format, key.dimension),
            view_formats: &[],
        });

        match pollster::block_on(device.pop_error_scope()) {
            None => Ok(texture),
            Some(e) => {
                texture.destroy();
                Err(backend::Error::Unsupported(format!("texture for {:?}: {}", key, e)))
            }
        }
    }

    /// Whether a cached texture still mirrors guest memory after `flush`.
    fn survives(flush: Flush, image: u32, image_size: u32) -> bool {
        !flush.overlaps(image, image_size.max(1))
    }
}

/// How a host texture for a guest surface may be used.
///
/// A surface can be sampled in one buffer and rendered to in the next, so every resource that
/// could be a render target is created as one. Depth formats can't be copied into.
fn texture_usage(format: TextureFormat, dimension: TextureDimension) -> TextureUsages {
    let renderable = dimension == TextureDimension::D2 && !format.is_compressed();
    let mut usage = TextureUsages::TEXTURE_BINDING;
    if !format.has_depth_aspect() && !format.has_stencil_aspect() {
        usage |= TextureUsages::COPY_DST;
    }
    if renderable {
        usage |= TextureUsages::RENDER_ATTACHMENT;
    }

    usage
}

/// The key of the entry bound longest ago.
fn least_recently_used<K>(entries: impl Iterator<Item = (K, u64)>) -> Option<K> {
    entries.min_by_key(|(_, last_used)| *last_used).map(|(key, _)| key)
}

impl crate::Backend for Renderer {
    fn name(&self) -> &'static str {
        self.api.name()
    }

    fn set_register(&mut self, _: u32, _: u32) -> Result<(), backend::Error> {
        // Register state is read back by the executor when a packet needs it.
        Ok(())
    }

    fn set_color_buffer(
        &mut self,
        index: u32,
        surface: &gx2::Surface,
    ) -> Result<(), backend::Error> {
        if surface.aa()?.sample_count() > 1 {
            return Err(backend::Error::Unsupported("multisampled color buffers".into()));
        }
        if surface.format().is_compressed() {
            return Err(backend::Error::Unsupported("compressed color buffers".into()));
        }
        if !surface.usage().contains(SurfaceUse::COLOR_BUFFER) {
            tracing::debug!("color buffer {} lacks the color buffer usage flag", index);
        }

        let texture = self.texture_for(surface)?;
        let view = texture.create_view(&TextureViewDescriptor {
            label: Some("color buffer"),
            dimension: Some(TextureViewDimension::D2),
            mip_level_count: Some(1),
            array_layer_count: Some(1),
            ..Default::default()
        });
        self.color_buffers.insert(index, view);

        Ok(())
    }

    fn set_pixel_texture(
        &mut self,
        unit: u32,
        texture: &gx2::Texture,
    ) -> Result<(), backend::Error> {
        let range = texture.view()?;
        let dim = texture.surface.dim()?;
        let dimension = format::view_dimension(dim)
            .ok_or_else(|| backend::Error::Unsupported(format!("{:?} views", dim)))?;

        let host = self.texture_for(&texture.surface)?;
        let view = host.create_view(&TextureViewDescriptor {
            label: Some("pixel texture"),
            dimension: Some(dimension),
            base_mip_level: range.first_mip,
            mip_level_count: Some(range.num_mips),
            base_array_layer: range.first_slice,
            array_layer_count: Some(range.num_slices),
            ..Default::default()
        });
        self.pixel_textures.insert(unit, view);

        Ok(())
    }

    fn clear_color(&mut self, index: u32, rgba: [f32; 4]) -> Result<(), backend::Error> {
        let view = self.color_buffers.remove(&index).ok_or_else(|| {
            backend::Error::Unsupported(format!("clear of unbound color buffer {}", index))
        })?;
        let [r, g, b, a] = rgba.map(f64::from);

        {
            let encoder = self.encoder();
            let _ = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("clear"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color { r, g, b, a }),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.color_buffers.insert(index, view);

        Ok(())
    }

    fn draw(&mut self, draw: Draw) -> Result<(), backend::Error> {
        // Guest shaders aren't translated, so draws only advance the frame's bookkeeping.
        tracing::trace!("draw {:?} with {} textures bound", draw, self.pixel_textures.len());
        self.pending_draws += 1;

        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), backend::Error> {
        self.frames += 1;
        tracing::debug!("frame {}: {} draws", self.frames, self.pending_draws);
        self.pending_draws = 0;

        Ok(())
    }

    fn invalidate(&mut self, flush: Flush) -> Result<(), backend::Error> {
        let before = self.textures.len();
        self.textures.retain(|key, cached| Self::survives(flush, key.image, cached.image_size));

        let evicted = before - self.textures.len();
        if evicted > 0 {
            tracing::debug!("{:?} evicted {} textures", flush, evicted);
        }

        Ok(())
    }

    fn submit(&mut self) -> Result<(), backend::Error> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
        if !self.in_scope {
            return Ok(());
        }
        self.in_scope = false;

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        let _ = self.device.poll(Maintain::Poll);

        if let Some(e) = out_of_memory {
            return Err(backend::Error::DeviceLost(e.to_string()));
        }
        match validation {
            None => Ok(()),
            Some(wgpu::Error::Validation { description, .. }) => {
                Err(backend::Error::Unsupported(description))
            }
            Some(e) => Err(backend::Error::DeviceLost(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apis_select_one_backend_each() {
        for api in [Api::Vulkan, Api::OpenGl, Api::Dx12] {
            assert_eq!(api.backends().bits().count_ones(), 1, "{}", api.name());
        }
    }

    #[test]
    fn depth_textures_are_never_copy_targets() {
        let depth = texture_usage(TextureFormat::Depth24PlusStencil8, TextureDimension::D2);
        assert!(!depth.contains(TextureUsages::COPY_DST));
        assert!(depth.contains(TextureUsages::RENDER_ATTACHMENT));

        let color = texture_usage(TextureFormat::Rgba8Unorm, TextureDimension::D2);
        assert!(color.contains(TextureUsages::COPY_DST | TextureUsages::RENDER_ATTACHMENT));

        let compressed = texture_usage(TextureFormat::Bc1RgbaUnorm, TextureDimension::D2);
        assert!(!compressed.contains(TextureUsages::RENDER_ATTACHMENT));

        let volume = texture_usage(TextureFormat::Rgba8Unorm, TextureDimension::D3);
        assert!(!volume.contains(TextureUsages::RENDER_ATTACHMENT));
    }

    #[test]
    fn eviction_picks_the_stalest_entry() {
        let entries = [(0x1000, 7), (0x2000, 3), (0x3000, 9)];
        assert_eq!(least_recently_used(entries.into_iter()), Some(0x2000));
        assert_eq!(least_recently_used(std::iter::empty::<(u32, u64)>()), None);
    }

    #[test]
    fn flushes_evict_overlapping_images() {
        let flush = Flush::Cpu { addr: 0x1000_0400, size: 4 };

        assert!(!Renderer::survives(flush, 0x1000_0000, 0x800));
        assert!(Renderer::survives(flush, 0x1000_0000, 0x400));
        // An unknown size still covers the first byte.
        assert!(!Renderer::survives(flush, 0x1000_0400, 0));
    }
}
