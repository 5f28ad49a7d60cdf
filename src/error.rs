#![allow(dead_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // Wire codec errors. A datagram that trips any of these is dropped
    // by the inbound handlers; the transport stays open.
    #[error("insufficient data for base length type")]
    ErrBaseLen,
    #[error("insufficient data for calculated length type")]
    ErrCalcLen,
    #[error("segment prefix is reserved")]
    ErrReservedBits,
    #[error("too many pointers")]
    ErrTooManyPtr,
    #[error("invalid pointer")]
    ErrInvalidPtr,
    #[error("segment length too long")]
    ErrSegTooLong,
    #[error("zero length segment")]
    ErrZeroSegLen,
    #[error("name too long")]
    ErrNameTooLong,
    #[error("insufficient data for resource body length")]
    ErrResourceLen,
    #[error("resource length too long")]
    ErrResTooLong,
    #[error("too many Questions to pack (>65535)")]
    ErrTooManyQuestions,
    #[error("too many Answers to pack (>65535)")]
    ErrTooManyAnswers,
    #[error("too many Authorities to pack (>65535)")]
    ErrTooManyAuthorities,
    #[error("too many Additionals to pack (>65535)")]
    ErrTooManyAdditionals,
    #[error("character string exceeds 255 bytes")]
    ErrStringTooLong,

    // Discovery errors.
    #[error("name is claimed by another responder")]
    ErrNameTaken,
    #[error("lost simultaneous probe tie-break")]
    ErrSimultaneousProbe,
    #[error("record conflicts with an established responder")]
    ErrConflict,
    #[error("instance rename attempts exhausted")]
    ErrRenameExhausted,
    #[error("aborted")]
    ErrAborted,

    #[error("connection closed")]
    ErrConnectionClosed,
    #[error("no proposed records")]
    ErrNoProposedRecords,
    #[error("invalid service instance name")]
    ErrInvalidServiceName,
    #[error("no local address to advertise")]
    ErrNoLocalAddress,
}
