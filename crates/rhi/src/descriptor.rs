//! Descriptor set layouts, pools and the growable set allocator.
//!
//! - [`LayoutShape`] is the immutable binding list a set layout is built from
//! - [`PoolCapacity`] is the per-set descriptor table every pool is sized by
//! - [`DescriptorAllocator`] hands out sets and replaces its pool when the
//!   driver reports exhaustion
//! - [`write_set`] fills a set from plain [`BindingWrite`] values
//!
//! # Growth
//!
//! A pool created for a budget of `n` sets reserves `n` times every entry of
//! the capacity table. When allocation fails with `ERROR_OUT_OF_POOL_MEMORY`
//! or `ERROR_FRAGMENTED_POOL`, the allocator retires the current pool,
//! raises the budget by one, creates a fresh pool and retries once. Any
//! other failure, or a failure on the retry, is returned to the caller.
//!
//! Retired pools are kept until the allocator is dropped. Sets issued from
//! them stay valid for the allocator's whole lifetime.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::descriptor::{
//!     DescriptorAllocator, DescriptorKind, DescriptorSetLayout, LayoutBinding, LayoutShape,
//!     PoolCapacity,
//! };
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> vkframe_rhi::RhiResult<()> {
//! let shape = LayoutShape::new(vec![LayoutBinding {
//!     binding: 0,
//!     kind: DescriptorKind::CombinedImageSampler,
//!     count: 1,
//!     stages: vk::ShaderStageFlags::FRAGMENT,
//! }])?;
//! let layout = DescriptorSetLayout::new(device.clone(), shape)?;
//!
//! let capacity = PoolCapacity {
//!     combined_image_samplers: 1,
//!     ..PoolCapacity::default()
//! };
//! let mut allocator = DescriptorAllocator::new(device, capacity, 16)?;
//! let set = allocator.allocate(&layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{ErrorKind, RhiError, RhiResult};

/// Descriptor types the renderer binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    StorageImage,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 4] = [
        DescriptorKind::UniformBuffer,
        DescriptorKind::StorageBuffer,
        DescriptorKind::CombinedImageSampler,
        DescriptorKind::StorageImage,
    ];

    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        }
    }
}

/// One `(slot, kind, count)` entry of a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// Ordered, validated list of bindings. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutShape {
    bindings: Vec<LayoutBinding>,
}

impl LayoutShape {
    /// Sorts by slot and rejects duplicates, zero counts and empty shapes.
    pub fn new(mut bindings: Vec<LayoutBinding>) -> RhiResult<Self> {
        if bindings.is_empty() {
            return Err(RhiError::InvalidArgument(
                "descriptor layout has no bindings".to_string(),
            ));
        }
        bindings.sort_by_key(|b| b.binding);
        for pair in bindings.windows(2) {
            if pair[0].binding == pair[1].binding {
                return Err(RhiError::InvalidArgument(format!(
                    "descriptor binding {} declared twice",
                    pair[0].binding
                )));
            }
        }
        if let Some(b) = bindings.iter().find(|b| b.count == 0) {
            return Err(RhiError::InvalidArgument(format!(
                "descriptor binding {} has zero count",
                b.binding
            )));
        }
        Ok(Self { bindings })
    }

    #[inline]
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn binding(&self, slot: u32) -> Option<&LayoutBinding> {
        self.bindings.iter().find(|b| b.binding == slot)
    }

    /// Descriptors of `kind` one set of this shape consumes.
    pub fn count_of(&self, kind: DescriptorKind) -> u32 {
        self.bindings
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.count)
            .sum()
    }
}

/// Vulkan descriptor set layout built from a [`LayoutShape`].
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    shape: LayoutShape,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, shape: LayoutShape) -> RhiResult<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = shape
            .bindings()
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.kind.to_vk())
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            shape,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn shape(&self) -> &LayoutShape {
        &self.shape
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptors reserved per set, by kind.
///
/// Fixed for the lifetime of an allocator, so the ratio between kinds is
/// the same in every pool generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolCapacity {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub combined_image_samplers: u32,
    pub storage_images: u32,
}

impl PoolCapacity {
    pub fn per_set(&self, kind: DescriptorKind) -> u32 {
        match kind {
            DescriptorKind::UniformBuffer => self.uniform_buffers,
            DescriptorKind::StorageBuffer => self.storage_buffers,
            DescriptorKind::CombinedImageSampler => self.combined_image_samplers,
            DescriptorKind::StorageImage => self.storage_images,
        }
    }

    pub fn is_empty(&self) -> bool {
        DescriptorKind::ALL.iter().all(|&k| self.per_set(k) == 0)
    }

    /// Pool sizes for a pool holding `sets` sets. Kinds with no capacity
    /// are left out.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        DescriptorKind::ALL
            .iter()
            .filter(|&&kind| self.per_set(kind) > 0)
            .map(|&kind| vk::DescriptorPoolSize {
                ty: kind.to_vk(),
                descriptor_count: self.per_set(kind).saturating_mul(sets),
            })
            .collect()
    }
}

/// A pool sets can be carved from.
pub trait SetPool {
    /// Allocates one set; the raw driver result is kept so the caller can
    /// tell exhaustion apart from everything else.
    fn allocate(&self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet, vk::Result>;
}

/// Creates pools for a [`DescriptorAllocator`].
pub trait PoolFactory {
    type Pool: SetPool;

    fn create_pool(&self, max_sets: u32, sizes: &[vk::DescriptorPoolSize])
    -> RhiResult<Self::Pool>;
}

/// Vulkan descriptor pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl SetPool for DescriptorPool {
    fn allocate(&self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool (max_sets={})", self.max_sets);
    }
}

/// Builds real [`DescriptorPool`]s.
pub struct VulkanPoolFactory {
    device: Arc<Device>,
}

impl VulkanPoolFactory {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }
}

impl PoolFactory for VulkanPoolFactory {
    type Pool = DescriptorPool;

    fn create_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<DescriptorPool> {
        DescriptorPool::new(self.device.clone(), max_sets, sizes)
    }
}

/// Allocates descriptor sets and grows its pool on exhaustion.
///
/// Single-writer: the frame loop owns it and allocation takes `&mut self`.
pub struct DescriptorAllocator<F: PoolFactory = VulkanPoolFactory> {
    capacity: PoolCapacity,
    budget: u32,
    current: F::Pool,
    retired: Vec<F::Pool>,
    factory: F,
}

impl DescriptorAllocator<VulkanPoolFactory> {
    pub fn new(device: Arc<Device>, capacity: PoolCapacity, initial_sets: u32) -> RhiResult<Self> {
        Self::with_factory(VulkanPoolFactory::new(device), capacity, initial_sets)
    }
}

impl<F: PoolFactory> DescriptorAllocator<F> {
    pub fn with_factory(factory: F, capacity: PoolCapacity, initial_sets: u32) -> RhiResult<Self> {
        if initial_sets == 0 || capacity.is_empty() {
            return Err(RhiError::InvalidArgument(format!(
                "descriptor allocator needs a nonzero budget and capacity, got {} sets of {:?}",
                initial_sets, capacity
            )));
        }

        let current = factory.create_pool(initial_sets, &capacity.pool_sizes(initial_sets))?;
        info!(
            "Descriptor allocator ready: {} set(s) per pool, {:?} per set",
            initial_sets, capacity
        );

        Ok(Self {
            capacity,
            budget: initial_sets,
            current,
            retired: Vec::new(),
            factory,
        })
    }

    /// Allocates a set for `layout`.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        self.allocate_raw(layout.handle())
    }

    /// Allocates a set for a raw layout handle.
    ///
    /// # Errors
    ///
    /// - The driver error, unchanged, for anything but exhaustion
    /// - [`RhiError::DescriptorPoolExhausted`] if the grown pool also fails
    pub fn allocate_raw(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        match self.current.allocate(layout) {
            Ok(set) => return Ok(set),
            Err(result) if ErrorKind::of(result) == ErrorKind::Exhaustion => {
                debug!("Descriptor pool exhausted ({}), growing", result);
            }
            Err(result) => return Err(result.into()),
        }

        self.grow()?;

        self.current
            .allocate(layout)
            .map_err(|result| RhiError::DescriptorPoolExhausted {
                budget: self.budget,
                result,
            })
    }

    fn grow(&mut self) -> RhiResult<()> {
        let budget = self.budget + 1;
        let pool = self
            .factory
            .create_pool(budget, &self.capacity.pool_sizes(budget))?;
        let old = std::mem::replace(&mut self.current, pool);
        self.retired.push(old);
        self.budget = budget;

        info!(
            "Descriptor pool grown to {} set(s), {} retired pool(s)",
            budget,
            self.retired.len()
        );
        Ok(())
    }

    /// Sets the current pool was sized for.
    #[inline]
    pub fn budget(&self) -> u32 {
        self.budget
    }

    #[inline]
    pub fn retired_pools(&self) -> usize {
        self.retired.len()
    }

    #[inline]
    pub fn capacity(&self) -> &PoolCapacity {
        &self.capacity
    }
}

/// Resource written into one binding slot.
#[derive(Clone, Copy, Debug)]
pub enum BoundResource {
    UniformBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    StorageBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        sampler: vk::Sampler,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
    /// Always accessed in `GENERAL`.
    StorageImage { view: vk::ImageView },
}

impl BoundResource {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            BoundResource::UniformBuffer { .. } => DescriptorKind::UniformBuffer,
            BoundResource::StorageBuffer { .. } => DescriptorKind::StorageBuffer,
            BoundResource::CombinedImageSampler { .. } => DescriptorKind::CombinedImageSampler,
            BoundResource::StorageImage { .. } => DescriptorKind::StorageImage,
        }
    }
}

/// One binding update.
#[derive(Clone, Copy, Debug)]
pub struct BindingWrite {
    pub binding: u32,
    pub resource: BoundResource,
}

enum ResourceInfo {
    Buffer([vk::DescriptorBufferInfo; 1]),
    Image([vk::DescriptorImageInfo; 1]),
}

impl From<&BoundResource> for ResourceInfo {
    fn from(resource: &BoundResource) -> Self {
        match *resource {
            BoundResource::UniformBuffer {
                buffer,
                offset,
                range,
            }
            | BoundResource::StorageBuffer {
                buffer,
                offset,
                range,
            } => ResourceInfo::Buffer([vk::DescriptorBufferInfo {
                buffer,
                offset,
                range,
            }]),
            BoundResource::CombinedImageSampler {
                sampler,
                view,
                layout,
            } => ResourceInfo::Image([vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            }]),
            BoundResource::StorageImage { view } => ResourceInfo::Image([vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: vk::ImageLayout::GENERAL,
            }]),
        }
    }
}

/// Checks every write targets a declared slot of the matching kind.
pub fn check_writes(shape: &LayoutShape, writes: &[BindingWrite]) -> RhiResult<()> {
    for write in writes {
        let Some(binding) = shape.binding(write.binding) else {
            return Err(RhiError::InvalidArgument(format!(
                "binding {} is not in the layout",
                write.binding
            )));
        };
        if binding.kind != write.resource.kind() {
            return Err(RhiError::InvalidArgument(format!(
                "binding {} expects {:?}, got {:?}",
                write.binding,
                binding.kind,
                write.resource.kind()
            )));
        }
    }
    Ok(())
}

/// Writes resources into a freshly allocated set.
///
/// Sets are written once, before first use, and never rewritten while a
/// frame may reference them.
pub fn write_set(
    device: &Device,
    layout: &DescriptorSetLayout,
    set: vk::DescriptorSet,
    writes: &[BindingWrite],
) -> RhiResult<()> {
    check_writes(layout.shape(), writes)?;

    let infos: Vec<ResourceInfo> = writes.iter().map(|w| (&w.resource).into()).collect();
    let vk_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .zip(&infos)
        .map(|(write, info)| {
            let base = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(write.binding)
                .descriptor_type(write.resource.kind().to_vk());
            match info {
                ResourceInfo::Buffer(buffer) => base.buffer_info(buffer),
                ResourceInfo::Image(image) => base.image_info(image),
            }
        })
        .collect();

    unsafe {
        device.handle().update_descriptor_sets(&vk_writes, &[]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use ash::vk::Handle;

    use super::*;

    /// Counts sets against `max_sets` and fails like a driver would.
    struct MockPool {
        max_sets: u32,
        issued: Cell<u32>,
        next_handle: Rc<Cell<u64>>,
        drops: Rc<Cell<u32>>,
        failure: Option<vk::Result>,
    }

    impl SetPool for MockPool {
        fn allocate(
            &self,
            _layout: vk::DescriptorSetLayout,
        ) -> Result<vk::DescriptorSet, vk::Result> {
            if let Some(failure) = self.failure {
                return Err(failure);
            }
            if self.issued.get() >= self.max_sets {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            self.issued.set(self.issued.get() + 1);
            let handle = self.next_handle.get() + 1;
            self.next_handle.set(handle);
            Ok(vk::DescriptorSet::from_raw(handle))
        }
    }

    impl Drop for MockPool {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[derive(Default)]
    struct MockFactory {
        next_handle: Rc<Cell<u64>>,
        drops: Rc<Cell<u32>>,
        created: RefCell<Vec<(u32, Vec<(vk::DescriptorType, u32)>)>>,
        /// Overrides the pool size after the first pool.
        grown_max_sets: Option<u32>,
        failure: Option<vk::Result>,
    }

    impl PoolFactory for MockFactory {
        type Pool = MockPool;

        fn create_pool(
            &self,
            max_sets: u32,
            sizes: &[vk::DescriptorPoolSize],
        ) -> RhiResult<MockPool> {
            let first = self.created.borrow().is_empty();
            self.created.borrow_mut().push((
                max_sets,
                sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect(),
            ));
            let effective = match self.grown_max_sets {
                Some(n) if !first => n,
                _ => max_sets,
            };
            Ok(MockPool {
                max_sets: effective,
                issued: Cell::new(0),
                next_handle: self.next_handle.clone(),
                drops: self.drops.clone(),
                failure: self.failure,
            })
        }
    }

    fn capacity() -> PoolCapacity {
        PoolCapacity {
            uniform_buffers: 2,
            storage_buffers: 0,
            combined_image_samplers: 3,
            storage_images: 1,
        }
    }

    fn layout() -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(0x10)
    }

    #[test]
    fn test_eleventh_allocation_grows_once() {
        let mut allocator =
            DescriptorAllocator::with_factory(MockFactory::default(), capacity(), 10).unwrap();

        let mut sets: Vec<vk::DescriptorSet> = (0..10)
            .map(|_| allocator.allocate_raw(layout()).unwrap())
            .collect();
        assert_eq!(allocator.budget(), 10);
        assert_eq!(allocator.retired_pools(), 0);

        let eleventh = allocator.allocate_raw(layout()).unwrap();
        assert_eq!(allocator.budget(), 11);
        assert_eq!(allocator.retired_pools(), 1);
        assert!(!sets.contains(&eleventh));
        assert_ne!(eleventh, vk::DescriptorSet::null());

        sets.push(eleventh);
        sets.sort_by_key(|s| s.as_raw());
        sets.dedup();
        assert_eq!(sets.len(), 11);
        assert_eq!(allocator.factory.created.borrow().len(), 2);
    }

    #[test]
    fn test_budget_after_m_growths() {
        // Grown pools hold a single set, so every further allocation grows.
        let factory = MockFactory {
            grown_max_sets: Some(1),
            ..MockFactory::default()
        };
        let drops = factory.drops.clone();
        let initial = 4;
        let mut allocator = DescriptorAllocator::with_factory(factory, capacity(), initial).unwrap();

        for _ in 0..initial {
            allocator.allocate_raw(layout()).unwrap();
        }
        let m = 5;
        for _ in 0..m {
            allocator.allocate_raw(layout()).unwrap();
        }

        assert_eq!(allocator.budget(), initial + m);
        assert_eq!(allocator.retired_pools(), m as usize);
        // No pool was destroyed while the allocator lives.
        assert_eq!(drops.get(), 0);

        drop(allocator);
        assert_eq!(drops.get(), m + 1);
    }

    #[test]
    fn test_growth_preserves_capacity_ratios() {
        let mut allocator =
            DescriptorAllocator::with_factory(MockFactory::default(), capacity(), 2).unwrap();
        for _ in 0..3 {
            allocator.allocate_raw(layout()).unwrap();
        }

        let created = allocator.factory.created.borrow();
        assert_eq!(created.len(), 2);
        let (sets, sizes) = &created[1];
        assert_eq!(*sets, 3);
        assert_eq!(
            sizes,
            &vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 6),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 9),
                (vk::DescriptorType::STORAGE_IMAGE, 3),
            ]
        );
    }

    #[test]
    fn test_second_failure_is_fatal() {
        let factory = MockFactory {
            grown_max_sets: Some(0),
            ..MockFactory::default()
        };
        let mut allocator = DescriptorAllocator::with_factory(factory, capacity(), 1).unwrap();
        allocator.allocate_raw(layout()).unwrap();

        let err = allocator.allocate_raw(layout()).unwrap_err();
        match err {
            RhiError::DescriptorPoolExhausted { budget, result } => {
                assert_eq!(budget, 2);
                assert_eq!(result, vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(allocator.retired_pools(), 1);
    }

    #[test]
    fn test_other_errors_do_not_grow() {
        let factory = MockFactory {
            failure: Some(vk::Result::ERROR_DEVICE_LOST),
            ..MockFactory::default()
        };
        let mut allocator = DescriptorAllocator::with_factory(factory, capacity(), 4).unwrap();
        let err = allocator.allocate_raw(layout()).unwrap_err();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(allocator.budget(), 4);
        assert_eq!(allocator.retired_pools(), 0);
    }

    #[test]
    fn test_fragmented_pool_also_grows() {
        let factory = MockFactory {
            failure: Some(vk::Result::ERROR_FRAGMENTED_POOL),
            ..MockFactory::default()
        };
        let mut allocator = DescriptorAllocator::with_factory(factory, capacity(), 4).unwrap();
        let err = allocator.allocate_raw(layout()).unwrap_err();
        assert!(matches!(
            err,
            RhiError::DescriptorPoolExhausted {
                budget: 5,
                result: vk::Result::ERROR_FRAGMENTED_POOL
            }
        ));
    }

    #[test]
    fn test_rejects_empty_configuration() {
        assert!(
            DescriptorAllocator::with_factory(MockFactory::default(), capacity(), 0).is_err()
        );
        assert!(
            DescriptorAllocator::with_factory(MockFactory::default(), PoolCapacity::default(), 4)
                .is_err()
        );
    }

    fn sampler_shape() -> LayoutShape {
        LayoutShape::new(vec![
            LayoutBinding {
                binding: 1,
                kind: DescriptorKind::StorageImage,
                count: 1,
                stages: vk::ShaderStageFlags::COMPUTE,
            },
            LayoutBinding {
                binding: 0,
                kind: DescriptorKind::CombinedImageSampler,
                count: 1,
                stages: vk::ShaderStageFlags::COMPUTE,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_layout_shape_sorted_and_counted() {
        let shape = sampler_shape();
        let slots: Vec<u32> = shape.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(slots, vec![0, 1]);
        assert_eq!(shape.count_of(DescriptorKind::StorageImage), 1);
        assert_eq!(shape.count_of(DescriptorKind::UniformBuffer), 0);
    }

    #[test]
    fn test_layout_shape_rejects_duplicates() {
        let binding = LayoutBinding {
            binding: 0,
            kind: DescriptorKind::UniformBuffer,
            count: 1,
            stages: vk::ShaderStageFlags::VERTEX,
        };
        assert!(LayoutShape::new(vec![binding, binding]).is_err());
        assert!(LayoutShape::new(vec![]).is_err());
        assert!(LayoutShape::new(vec![LayoutBinding { count: 0, ..binding }]).is_err());
    }

    #[test]
    fn test_check_writes_matches_kinds() {
        let shape = sampler_shape();
        let good = [
            BindingWrite {
                binding: 0,
                resource: BoundResource::CombinedImageSampler {
                    sampler: vk::Sampler::null(),
                    view: vk::ImageView::null(),
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            },
            BindingWrite {
                binding: 1,
                resource: BoundResource::StorageImage {
                    view: vk::ImageView::null(),
                },
            },
        ];
        assert!(check_writes(&shape, &good).is_ok());

        let wrong_kind = [BindingWrite {
            binding: 0,
            resource: BoundResource::StorageImage {
                view: vk::ImageView::null(),
            },
        }];
        assert!(check_writes(&shape, &wrong_kind).is_err());

        let missing = [BindingWrite {
            binding: 7,
            resource: BoundResource::StorageImage {
                view: vk::ImageView::null(),
            },
        }];
        assert!(check_writes(&shape, &missing).is_err());
    }
}
