//! GPU resource ownership for the UI bridge.
//!
//! The [`ResourceCache`] owns every GPU object backing UI rendering: the
//! combined vertex/index buffers, the fixed-size uniform buffer, the two
//! samplers, one texture record per registered identity, and the graphics
//! pipeline. Everything is created lazily on first need, grown on demand
//! and destroyed on [`release`](ResourceCache::release).
//!
//! The cache is exclusively owned and mutated by the render-recording
//! context. Registering textures is only safe at the host's sync points,
//! with the producing context quiesced.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    rhi::{BufferUsage, FilterMode, PipelineSpec, ResourceError, Rhi},
    snapshot::{AtlasImage, TexId},
};

/// Uniform block layout: 64-byte column-major mvp, 4-byte opacity, padded
/// to the 16-byte uniform alignment.
pub const UNIFORM_BUFFER_SIZE: u64 = 80;

/// Byte offset of the opacity scalar inside the uniform block.
pub const OPACITY_OFFSET: u64 = 64;

/// Pixel data or an existing device texture to back a registration.
pub enum TextureSource<R: Rhi> {
    /// The cache creates and uploads the texture itself. Always
    /// cache-owned.
    Pixels(AtlasImage),
    /// A texture that already exists on the device, typically rendered to
    /// by a host collaborator.
    External(R::Texture),
}

/// Who destroys the GPU texture when the record goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureOwnership {
    /// The cache destroys the texture on release or re-registration.
    Cache,
    /// The caller keeps ownership; the cache only detaches its handle.
    Caller,
}

/// Per-identity texture state: source pixels (for cache-created textures),
/// the lazily created device texture, and the shader-resource set binding
/// it together with the uniform buffer and a sampler.
pub struct TextureRecord<R: Rhi> {
    pixels: Option<AtlasImage>,
    texture: Option<R::Texture>,
    resources: Option<R::ShaderResources>,
    filter: FilterMode,
    ownership: TextureOwnership,
}

impl<R: Rhi> TextureRecord<R> {
    pub fn texture(&self) -> Option<&R::Texture> {
        self.texture.as_ref()
    }

    pub fn shader_resources(&self) -> Option<&R::ShaderResources> {
        self.resources.as_ref()
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn ownership(&self) -> TextureOwnership {
        self.ownership
    }
}

struct BufferSlot<B> {
    buffer: B,
    size: u64,
}

/// Owner of all GPU objects backing UI rendering.
pub struct ResourceCache<R: Rhi> {
    rhi: R,
    spec: PipelineSpec,
    vbuf: Option<BufferSlot<R::Buffer>>,
    ibuf: Option<BufferSlot<R::Buffer>>,
    ubuf: Option<BufferSlot<R::Buffer>>,
    linear_sampler: Option<R::Sampler>,
    nearest_sampler: Option<R::Sampler>,
    textures: HashMap<TexId, TextureRecord<R>>,
    pipeline: Option<(R::Pipeline, R::PassFormat)>,
}

impl<R: Rhi> ResourceCache<R> {
    pub fn new(rhi: R, spec: PipelineSpec) -> Self {
        ResourceCache {
            rhi,
            spec,
            vbuf: None,
            ibuf: None,
            ubuf: None,
            linear_sampler: None,
            nearest_sampler: None,
            textures: HashMap::new(),
            pipeline: None,
        }
    }

    pub fn backend(&self) -> &R {
        &self.rhi
    }

    /// Creates the buffers on first use and grows any one whose required
    /// size exceeds its current allocation. Growth is a reallocation; the
    /// new buffer must be created successfully before the old one is
    /// replaced, so a failed ensure leaves the cache usable for the next
    /// frame. Buffers never shrink.
    pub fn ensure_buffers(
        &mut self,
        vbuf_size: u64,
        ibuf_size: u64,
        ubuf_size: u64,
    ) -> Result<(), ResourceError> {
        Self::ensure_buffer_slot(&self.rhi, &mut self.vbuf, BufferUsage::Vertex, vbuf_size, "ui vertex buffer")?;
        Self::ensure_buffer_slot(&self.rhi, &mut self.ibuf, BufferUsage::Index, ibuf_size, "ui index buffer")?;
        let ubuf_recreated = Self::ensure_buffer_slot(
            &self.rhi,
            &mut self.ubuf,
            BufferUsage::Uniform,
            ubuf_size,
            "ui uniform buffer",
        )?;
        if ubuf_recreated {
            // Shader-resource sets bind the uniform buffer; a grown one
            // leaves them pointing at the old allocation.
            for record in self.textures.values_mut() {
                record.resources = None;
            }
        }
        Ok(())
    }

    /// Returns whether the slot was (re)created with a new buffer on top of
    /// an existing one.
    fn ensure_buffer_slot(
        rhi: &R,
        slot: &mut Option<BufferSlot<R::Buffer>>,
        usage: BufferUsage,
        size: u64,
        label: &str,
    ) -> Result<bool, ResourceError> {
        match slot {
            None => {
                let buffer = rhi.create_buffer(usage, size, label)?;
                *slot = Some(BufferSlot { buffer, size });
                Ok(false)
            }
            Some(existing) if size > existing.size => {
                debug!(label, from = existing.size, to = size, "growing buffer");
                let buffer = rhi.create_buffer(usage, size, label)?;
                *slot = Some(BufferSlot { buffer, size });
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    fn ensure_uniform_buffer(&mut self) -> Result<(), ResourceError> {
        Self::ensure_buffer_slot(
            &self.rhi,
            &mut self.ubuf,
            BufferUsage::Uniform,
            UNIFORM_BUFFER_SIZE,
            "ui uniform buffer",
        )
        .map(|_| ())
    }

    /// Creates the samplers lazily. Idempotent.
    pub fn ensure_sampler(&mut self) -> Result<(), ResourceError> {
        if self.linear_sampler.is_none() {
            self.linear_sampler = Some(self.rhi.create_sampler(FilterMode::Linear)?);
        }
        if self.nearest_sampler.is_none() {
            self.nearest_sampler = Some(self.rhi.create_sampler(FilterMode::Nearest)?);
        }
        Ok(())
    }

    /// Inserts or updates the record for `id`. No GPU work happens here;
    /// texture and shader-resource creation is deferred to the next
    /// [`ensure_texture`](Self::ensure_texture) pass. Re-registering an
    /// existing identity replaces its source and schedules its GPU objects
    /// for recreation without changing the identity itself.
    ///
    /// Must only be called from the render-recording context, with the
    /// producing context quiesced.
    pub fn register_texture(
        &mut self,
        id: TexId,
        source: TextureSource<R>,
        filter: FilterMode,
        ownership: TextureOwnership,
    ) {
        let record = match source {
            TextureSource::Pixels(pixels) => TextureRecord {
                pixels: Some(pixels),
                texture: None,
                resources: None,
                filter,
                ownership: TextureOwnership::Cache,
            },
            TextureSource::External(texture) => TextureRecord {
                pixels: None,
                texture: Some(texture),
                resources: None,
                filter,
                ownership,
            },
        };
        if let Some(old) = self.textures.insert(id, record) {
            debug!(?id, "texture identity re-registered");
            self.dispose_record(old);
        }
    }

    /// Creates the device texture (uploading its pixels into `batch`) and
    /// its shader-resource set if either does not exist yet.
    pub fn ensure_texture(
        &mut self,
        id: TexId,
        batch: &mut R::UpdateBatch,
    ) -> Result<&TextureRecord<R>, ResourceError> {
        use crate::rhi::ResourceUpdates;

        self.ensure_sampler()?;
        self.ensure_uniform_buffer()?;

        let Some(record) = self.textures.get_mut(&id) else {
            return Err(ResourceError::UnknownTexture(id));
        };

        if record.texture.is_none()
            && let Some(pixels) = record.pixels.as_ref()
        {
            let texture = self
                .rhi
                .create_texture([pixels.width, pixels.height], "ui texture")?;
            batch.upload_texture(&texture, pixels);
            record.texture = Some(texture);
        }

        if record.resources.is_none()
            && let (Some(texture), Some(ubuf)) = (
                record.texture.as_ref(),
                self.ubuf.as_ref().map(|slot| &slot.buffer),
            )
        {
            let sampler = match record.filter {
                FilterMode::Linear => self.linear_sampler.as_ref(),
                FilterMode::Nearest => self.nearest_sampler.as_ref(),
            };
            if let Some(sampler) = sampler {
                record.resources = Some(self.rhi.create_shader_resources(ubuf, texture, sampler)?);
            }
        }

        Ok(&self.textures[&id])
    }

    /// Creates the graphics pipeline lazily, rebuilding it when the pass
    /// format differs from the one it was created against. Render-target
    /// teardown and recreation with an identical format leaves the pipeline
    /// untouched.
    pub fn ensure_pipeline(&mut self, format: &R::PassFormat) -> Result<(), ResourceError> {
        if let Some((_, current)) = &self.pipeline {
            if current == format {
                return Ok(());
            }
            debug!(from = ?current, to = ?format, "pass format changed, rebuilding pipeline");
        }
        let pipeline = self.rhi.create_pipeline(self.spec, format)?;
        self.pipeline = Some((pipeline, format.clone()));
        Ok(())
    }

    pub fn vertex_buffer(&self) -> Option<&R::Buffer> {
        self.vbuf.as_ref().map(|slot| &slot.buffer)
    }

    pub fn index_buffer(&self) -> Option<&R::Buffer> {
        self.ibuf.as_ref().map(|slot| &slot.buffer)
    }

    pub fn uniform_buffer(&self) -> Option<&R::Buffer> {
        self.ubuf.as_ref().map(|slot| &slot.buffer)
    }

    pub fn pipeline(&self) -> Option<&R::Pipeline> {
        self.pipeline.as_ref().map(|(pipeline, _)| pipeline)
    }

    pub fn texture_record(&self, id: TexId) -> Option<&TextureRecord<R>> {
        self.textures.get(&id)
    }

    /// Destroys all owned GPU objects. Cache-owned textures are destroyed;
    /// caller-owned ones are detached and stay valid for their owner.
    /// Idempotent, and the cache may be repopulated lazily afterwards (a
    /// window can be torn down and recreated).
    pub fn release(&mut self) {
        let count = self.textures.len();
        if count > 0 || self.pipeline.is_some() || self.vbuf.is_some() {
            debug!(textures = count, "releasing ui gpu resources");
        }
        let records: Vec<_> = self.textures.drain().map(|(_, record)| record).collect();
        for record in records {
            self.dispose_record(record);
        }
        self.vbuf = None;
        self.ibuf = None;
        self.ubuf = None;
        self.linear_sampler = None;
        self.nearest_sampler = None;
        self.pipeline = None;
    }

    fn dispose_record(&self, record: TextureRecord<R>) {
        if let Some(texture) = record.texture
            && record.ownership == TextureOwnership::Cache
        {
            self.rhi.destroy_texture(texture);
        }
    }
}
