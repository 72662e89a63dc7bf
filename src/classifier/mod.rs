//! Packet-in classification
//!
//! Every packet-in runs through [`PacketClassifier`]:
//! 1. address-assignment (DHCP discover/offer/request/ack) is flooded on the
//!    originating switch and nothing else happens;
//! 2. the topology learner sees the event, and the path manager too unless
//!    the frame is LLDP;
//! 3. UDP over IPv4 is counted per source address, and a source whose count
//!    exceeds the threshold is blocked on every known switch.

mod counter;
mod packet;
mod path;
mod pipeline;

pub use counter::{
    MitigationPolicy, SourceCounter, Verdict, DEFAULT_BLOCK_PRIORITY, DEFAULT_THRESHOLD,
};
pub use packet::{frames, IpFields, PacketHeaders, PacketIn, TransportPorts};
pub use path::{LearningPathManager, PathManager, FORWARDING_PRIORITY};
pub use pipeline::{Disposition, PacketClassifier};
