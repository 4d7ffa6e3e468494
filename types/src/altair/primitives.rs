/// A bitmap of inclusion flags, one per timeliness criterion.
///
/// Any nonzero value means the validator has had at least one of its flags
/// credited in the epoch it belongs to.
pub type ParticipationFlags = u8;
