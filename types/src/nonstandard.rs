/// Like `Fork` in `consensus-specs`, but able to represent phases of the chain
/// rather than fork versions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Phase {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttestationEpoch {
    Previous,
    Current,
}
