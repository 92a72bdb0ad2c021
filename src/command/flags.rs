use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u16 {
        const WRITE         = 1 << 0;
        const READONLY       = 1 << 1;
        const ADMIN          = 1 << 2;
        const PUBSUB         = 1 << 3;
        const TRANSACTION    = 1 << 4;
        const MOVABLEKEYS    = 1 << 5;
        const CLUSTER_INTERNAL = 1 << 6;
    }
}
