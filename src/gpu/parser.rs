//! C10 — GPU Command Parser: walks a guest command buffer, interprets
//! PM4 Type-3 packets, tracks minimal pipeline state, and emits abstract
//! commands into the Render Command Queue.

use super::commands::{GpuTrackedState, RenderCommand};
use super::pm4::{opcode, PacketHeader};
use super::queue::RenderCommandQueue;
use crate::logger::Logger;
use crate::memory::GuestMemory;

const MAX_NESTING_DEPTH: u32 = 16;

/// Carries no cross-call state of its own beyond the tracked GPU state,
/// which the caller may reset between buffer groups (spec §4.4).
pub struct GpuCommandParser {
    tracked: GpuTrackedState,
    logger: Logger,
}

impl GpuCommandParser {
    pub fn new(logger: Logger) -> Self {
        Self { tracked: GpuTrackedState::default(), logger }
    }

    pub fn reset_tracked_state(&mut self) {
        self.tracked = GpuTrackedState::default();
    }

    pub fn tracked_state(&self) -> GpuTrackedState {
        self.tracked
    }

    /// Parses `word_count` 32-bit words starting at `address` and pushes
    /// emitted commands into `queue`.
    pub fn parse_buffer(
        &mut self,
        mem: &GuestMemory,
        queue: &RenderCommandQueue,
        address: u64,
        word_count: usize,
    ) {
        self.parse_buffer_inner(mem, queue, address, word_count, 0);
    }

    fn parse_buffer_inner(
        &mut self,
        mem: &GuestMemory,
        queue: &RenderCommandQueue,
        address: u64,
        word_count: usize,
        depth: u32,
    ) {
        if depth > MAX_NESTING_DEPTH {
            self.logger.warning("gpu::parser", "indirect buffer nesting depth exceeded, aborting");
            return;
        }

        let mut offset: usize = 0;
        while offset < word_count {
            let header_word = match self.read_word(mem, address, offset) {
                Some(w) => w,
                None => {
                    self.logger.warning("gpu::parser", "header read past end of buffer");
                    return;
                }
            };
            let header = PacketHeader::decode(header_word);

            if header.packet_type != PacketHeader::TYPE3 {
                self.logger.debug(
                    "gpu::parser",
                    &format!("non-type-3 packet (type={}), skipping one word", header.packet_type),
                );
                offset += 1;
                continue;
            }

            let payload_len = header.payload_len();
            if offset + 1 + payload_len > word_count {
                self.logger.warning(
                    "gpu::parser",
                    &format!(
                        "packet payload overruns buffer (opcode=0x{:02X}, len={})",
                        header.opcode, payload_len
                    ),
                );
                return;
            }

            let mut payload = Vec::with_capacity(payload_len);
            for i in 0..payload_len {
                match self.read_word(mem, address, offset + 1 + i) {
                    Some(w) => payload.push(w),
                    None => {
                        self.logger.warning("gpu::parser", "payload read past end of buffer");
                        return;
                    }
                }
            }

            self.dispatch(mem, queue, header.opcode, &payload, depth);
            offset += 1 + payload_len;
        }
    }

    fn read_word(&self, mem: &GuestMemory, base: u64, index: usize) -> Option<u32> {
        mem.read::<u32>(base + (index as u64) * 4).ok()
    }

    fn dispatch(
        &mut self,
        mem: &GuestMemory,
        queue: &RenderCommandQueue,
        op: u8,
        payload: &[u32],
        depth: u32,
    ) {
        // Guest-controlled `count` only bounds the total payload against
        // the buffer (checked by the caller); it says nothing about
        // whether the payload is long enough for the fields a given
        // opcode expects. A short/malformed packet must degrade to zeros
        // rather than panic on an out-of-bounds index.
        let word = |i: usize| payload.get(i).copied().unwrap_or(0);

        match op {
            opcode::NOP => {}
            opcode::CONTEXT_CONTROL => {}
            opcode::INDEX_TYPE => {
                self.tracked.index_type = word(0) & 0x3;
            }
            opcode::DRAW_INDEX_AUTO => {
                queue.push(RenderCommand::Draw {
                    vertex_count: word(0),
                    instance_count: self.tracked.instance_count,
                    first_vertex: 0,
                    first_instance: 0,
                });
            }
            opcode::DRAW_INDEX_2 => {
                let address = (word(1) as u64) | ((word(2) as u64) << 32);
                let index_count = word(3);
                queue.push(RenderCommand::DrawIndexed {
                    index_count,
                    instance_count: self.tracked.instance_count,
                    first_index: 0,
                    vertex_offset: 0,
                    index_type: self.tracked.index_type,
                    index_buffer_address: address,
                });
            }
            opcode::NUM_INSTANCES => {
                self.tracked.instance_count = word(0);
            }
            opcode::DISPATCH_DIRECT => {
                queue.push(RenderCommand::ComputeDispatch {
                    x: word(0),
                    y: word(1),
                    z: word(2),
                });
            }
            opcode::INDIRECT_BUFFER => {
                let nested_addr = (word(0) as u64) | ((word(1) as u64) << 32);
                let nested_words = word(2) as usize;
                self.parse_buffer_inner(mem, queue, nested_addr, nested_words, depth + 1);
            }
            opcode::EVENT_WRITE
            | opcode::EVENT_WRITE_EOP
            | opcode::ACQUIRE_MEM
            | opcode::RELEASE_MEM => {
                // barrier-class packets: accepted silently
            }
            opcode::SET_CONTEXT_REG | opcode::SET_SH_REG | opcode::SET_UCONFIG_REG => {
                // register-write packets: accepted, not required to act on
            }
            other => {
                self.logger.debug("gpu::parser", &format!("ignored opcode 0x{other:02X}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::USER_BASE;

    fn setup() -> (GpuCommandParser, GuestMemory, RenderCommandQueue) {
        let logger = Logger::default();
        let mem = GuestMemory::new(&logger).unwrap();
        (GpuCommandParser::new(logger), mem, RenderCommandQueue::new())
    }

    fn write_words(mem: &mut GuestMemory, addr: u64, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            mem.write::<u32>(addr + (i as u64) * 4, *w).unwrap();
        }
    }

    #[test]
    fn draw_index_auto_emits_draw() {
        let (mut parser, mut mem, queue) = setup();
        let header = PacketHeader {
            packet_type: PacketHeader::TYPE3,
            count: 1,
            opcode: opcode::DRAW_INDEX_AUTO,
        };
        let header_word = (3u32 << 30) | ((header.count as u32) << 16) | ((header.opcode as u32) << 8);
        write_words(&mut mem, USER_BASE, &[header_word, 128, 0]);
        parser.parse_buffer(&mem, &queue, USER_BASE, 3);
        let drained = queue.pop_all();
        assert_eq!(
            drained,
            vec![RenderCommand::Draw { vertex_count: 128, instance_count: 1, first_vertex: 0, first_instance: 0 }]
        );
    }

    #[test]
    fn overrunning_payload_terminates_parse() {
        let (mut parser, mut mem, queue) = setup();
        // count=5 claims 6 payload words but buffer only has 2 words total
        let header_word = (3u32 << 30) | (5u32 << 16) | ((opcode::DRAW_INDEX_AUTO as u32) << 8);
        write_words(&mut mem, USER_BASE, &[header_word, 1]);
        parser.parse_buffer(&mem, &queue, USER_BASE, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn non_type3_packet_is_skipped_one_word() {
        let (mut parser, mut mem, queue) = setup();
        let type0_word = 0u32; // type bits 00
        let draw_header = (3u32 << 30) | (1u32 << 16) | ((opcode::DRAW_INDEX_AUTO as u32) << 8);
        write_words(&mut mem, USER_BASE, &[type0_word, draw_header, 42, 0]);
        parser.parse_buffer(&mem, &queue, USER_BASE, 4);
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn indirect_buffer_recurses_into_nested_region() {
        let (mut parser, mut mem, queue) = setup();
        let nested_addr = USER_BASE + 0x1000;
        let draw_header = (3u32 << 30) | (1u32 << 16) | ((opcode::DRAW_INDEX_AUTO as u32) << 8);
        write_words(&mut mem, nested_addr, &[draw_header, 7, 0]);

        let ib_header = (3u32 << 30) | (2u32 << 16) | ((opcode::INDIRECT_BUFFER as u32) << 8);
        write_words(
            &mut mem,
            USER_BASE,
            &[ib_header, nested_addr as u32, (nested_addr >> 32) as u32, 3],
        );
        parser.parse_buffer(&mem, &queue, USER_BASE, 4);
        let drained = queue.pop_all();
        assert_eq!(
            drained,
            vec![RenderCommand::Draw { vertex_count: 7, instance_count: 1, first_vertex: 0, first_instance: 0 }]
        );
    }

    #[test]
    fn num_instances_then_draw_index_auto_uses_tracked_count() {
        let (mut parser, mut mem, queue) = setup();
        let ni_header = (3u32 << 30) | (0u32 << 16) | ((opcode::NUM_INSTANCES as u32) << 8);
        let draw_header = (3u32 << 30) | (1u32 << 16) | ((opcode::DRAW_INDEX_AUTO as u32) << 8);
        write_words(&mut mem, USER_BASE, &[ni_header, 4, draw_header, 10, 0]);
        parser.parse_buffer(&mut mem, &queue, USER_BASE, 5);
        let drained = queue.pop_all();
        assert_eq!(
            drained,
            vec![RenderCommand::Draw { vertex_count: 10, instance_count: 4, first_vertex: 0, first_instance: 0 }]
        );
    }
}
