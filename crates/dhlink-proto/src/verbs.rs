//! Named constants for the verbs of the line protocol.
//!
//! Shared by the message codec and the handshake drivers so that the wire
//! spelling lives in one place.

// ---------------------------------------------------------------------------
// Diffie-Hellman
// ---------------------------------------------------------------------------

/// `PARAM p g` -- initiator proposes the group.
pub const VERB_PARAM: &str = "PARAM";

/// `ACK` -- responder accepted the group.
pub const VERB_ACK: &str = "ACK";

/// `PUB v` -- a public value.
pub const VERB_PUB: &str = "PUB";

/// `SHARED v` -- the initiator's computed secret, echoed for comparison.
pub const VERB_SHARED: &str = "SHARED";

/// `OK` -- echoed secret matched.
pub const VERB_OK: &str = "OK";

/// `ERR` -- echoed secret did not match.
pub const VERB_ERR: &str = "ERR";

// ---------------------------------------------------------------------------
// RSA transport
// ---------------------------------------------------------------------------

/// `RSA_PUB n e` -- initiator's public key.
pub const VERB_RSA_PUB: &str = "RSA_PUB";

/// `ENC_SHARE c` -- responder's secret wrapped under the public key.
pub const VERB_ENC_SHARE: &str = "ENC_SHARE";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// `IV v` -- the CBC initialisation vector, sent once.
pub const VERB_IV: &str = "IV";

/// `MSG <hex>` -- one encrypted message.
pub const VERB_MSG: &str = "MSG";

/// `BYE` -- sender is done.
pub const VERB_BYE: &str = "BYE";
