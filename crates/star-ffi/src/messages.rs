//! Native Error Identifiers
//!
//! Short error messages are stable tokens of the form `LIB(IDENTIFIER)`.
//! The wrapped library signals most of them itself; the identifiers in
//! [`codes`] are the ones the bridge synthesizes for its own failures so that
//! they travel through the same channel as native ones.

/// Prefix the wrapped library puts in front of every error identifier
pub const ERROR_PREFIX: &str = "LIB";

/// Identifiers synthesized by the bridge
pub mod codes {
    /// Scratch or native allocation failed
    pub const MALLOC_FAILURE: &str = "MALLOCFAILURE";
    /// Native call reported more rows than the output can hold
    pub const ARRAY_TOO_SMALL: &str = "ARRAYTOOSMALL";
    /// Argument shape does not match the declared shape
    pub const BAD_ARRAY_SHAPE: &str = "BADARRAYSHAPE";
    /// Argument element type cannot be converted
    pub const WRONG_DATA_TYPE: &str = "WRONGDATATYPE";
    /// Scalar supplied where a sequence was required
    pub const NOT_A_SEQUENCE: &str = "NOTASEQUENCE";
    /// Integer value does not fit the native integer width
    pub const VALUE_OUT_OF_RANGE: &str = "VALUEOUTOFRANGE";
    /// Unknown verb or value passed to the mode-configuration entry point
    pub const INVALID_ACTION: &str = "INVALIDACTION";
    /// Unknown option passed to the message-retrieval entry point
    pub const INVALID_OPTION: &str = "INVALIDOPTION";
    /// Traceback frame popped under the wrong name
    pub const NAMES_DO_NOT_MATCH: &str = "NAMESDONOTMATCH";
    /// Native call returned a null pointer with a non-zero count
    pub const NULL_POINTER: &str = "NULLPOINTER";
    /// In/out argument storage also passed as another argument of the call
    pub const ALIASED_ARGUMENT: &str = "ALIASEDARGUMENT";
    /// Host buffer handed out for writing was read-only
    pub const READ_ONLY_BUFFER: &str = "READONLYBUFFER";
    /// Internal invariant violated inside the bridge
    pub const BUG: &str = "BUG";
}

/// Build a full short message such as `LIB(MALLOCFAILURE)` from an identifier.
pub fn short_code(identifier: &str) -> String {
    format!("{}({})", ERROR_PREFIX, identifier)
}

/// Strip any `PREFIX(...)` wrapper from a short message.
///
/// Returns the bare identifier; input without a wrapper is returned trimmed.
pub fn strip_prefix(short: &str) -> &str {
    let short = short.trim();
    match (short.find('('), short.ends_with(')')) {
        (Some(open), true) if open > 0 => &short[open + 1..short.len() - 1],
        _ => short,
    }
}

/// Explanation text for a short message, as reported by the EXPLAIN option.
///
/// Identifiers without a documented explanation yield an empty string.
pub fn explain(short: &str) -> &'static str {
    match strip_prefix(short) {
        "MALLOCFAILURE" => "Memory could not be allocated for a work area or result buffer.",
        "ARRAYTOOSMALL" => "An output array is too small to hold the results of the call.",
        "BADARRAYSHAPE" => "An array argument does not have the shape the call requires.",
        "WRONGDATATYPE" => "An argument has an element type that cannot be used by the call.",
        "NOTASEQUENCE" => "A scalar was supplied where an array argument was required.",
        "VALUEOUTOFRANGE" => "A value does not fit in the native integer type.",
        "INVALIDACTION" => "An unrecognized error action or verb was requested.",
        "INVALIDOPTION" => "An unrecognized option was requested.",
        "NAMESDONOTMATCH" => "A routine left the traceback under a name other than the one it entered with.",
        "NULLPOINTER" => "A native routine returned no data where data was expected.",
        "ALIASEDARGUMENT" => "An array passed as an in/out argument was also passed as another argument of the same call.",
        "READONLYBUFFER" => "A read-only buffer was used as an output target.",
        "DIVIDEBYZERO" => "An attempt was made to divide by zero.",
        "INDEXOUTOFRANGE" => "An index is outside the range of valid indices.",
        "INVALIDINDEX" => "An index is outside the range of valid indices.",
        "ZEROVECTOR" => "A vector of zero length was supplied where a direction is required.",
        "ZEROLENGTH" => "A quantity that must have non-zero length has length zero.",
        "NOTAROTATION" => "A matrix that must be a rotation is not one.",
        "FILENOTFOUND" => "A file named as input does not exist.",
        "FILEOPENFAILED" => "A file could not be opened.",
        "FILEREADFAILED" => "An attempt to read from a file failed.",
        "NOLOADEDFILES" => "No data files have been loaded.",
        "BODYNAMENOTFOUND" => "A body name could not be translated to an ID code.",
        "IDCODENOTFOUND" => "An ID code could not be translated to a name.",
        "UNKNOWNFRAME" => "A reference frame name is not recognized.",
        "SPKINSUFFDATA" => "Insufficient ephemeris data is loaded for the requested computation.",
        "CKINSUFFDATA" => "Insufficient pointing data is loaded for the requested computation.",
        "INVALIDSIZE" => "A size argument is out of the permitted range.",
        "INVALIDDIMENSION" => "A dimension argument is out of the permitted range.",
        "NOTINITIALIZED" => "A subsystem was used before it was initialized.",
        "BUG" => "An internal consistency check failed.",
        _ => "",
    }
}
