//! C3 data types: the abstract render command stream and the minimal
//! pipeline state the GPU Command Parser tracks between packets.

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Clear { color: [f32; 4], depth: f32, stencil: u8 },
    SetPipeline { state: u32 },
    BindVertexBuffer { address: u64, stride: u32 },
    BindIndexBuffer { address: u64, index_type: u32 },
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        index_type: u32,
        index_buffer_address: u64,
    },
    ComputeDispatch { x: u32, y: u32, z: u32 },
    EndFrame,
}

/// Mutated only by the packet parser; snapshotted by value into emitted
/// commands that need it (spec §3 GPU Tracked State).
#[derive(Debug, Clone, Copy)]
pub struct GpuTrackedState {
    pub index_buffer_address: u64,
    pub index_type: u32,
    pub instance_count: u32,
    pub primitive_type: u32,
    pub shader_addresses: [u64; 6],
}

impl Default for GpuTrackedState {
    fn default() -> Self {
        Self {
            index_buffer_address: 0,
            index_type: 0,
            instance_count: 1,
            primitive_type: 0,
            shader_addresses: [0; 6],
        }
    }
}
