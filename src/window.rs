//! The fixed-length ring of unacknowledged packets, indexed by
//! `sequence mod W`. Preallocated once at `open`, so neither the producer
//! thread nor the ack thread ever allocates on the hot path.

#[derive(Debug, Clone, Default)]
pub struct PacketSlot {
    pub sequence: u32,
    pub bytes: Vec<u8>,
    pub timestamp: f64,
    pub retransmitted: bool,
}

#[derive(Debug)]
pub struct PacketBuffer {
    window: usize,
    slots: Vec<PacketSlot>,
}

impl PacketBuffer {
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "sender window must be nonzero");
        PacketBuffer { window, slots: vec![PacketSlot::default(); window] }
    }

    fn index(&self, sequence: u32) -> usize {
        sequence as usize % self.window
    }

    /// Writes a freshly-produced packet into its slot, clearing the
    /// retransmitted flag (Karn's algorithm: a reused slot starts clean).
    pub fn store(&mut self, sequence: u32, bytes: Vec<u8>, timestamp: f64) {
        let idx = self.index(sequence);
        self.slots[idx] = PacketSlot { sequence, bytes, timestamp, retransmitted: false };
    }

    /// Refreshes a slot's timestamp for a retransmission; bytes are unchanged.
    pub fn mark_retransmitted(&mut self, sequence: u32, timestamp: f64) {
        let idx = self.index(sequence);
        let slot = &mut self.slots[idx];
        debug_assert_eq!(slot.sequence, sequence);
        slot.timestamp = timestamp;
        slot.retransmitted = true;
    }

    pub fn get(&self, sequence: u32) -> &PacketSlot {
        &self.slots[self.index(sequence)]
    }
}
