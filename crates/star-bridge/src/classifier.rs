//! Error Classifier
//!
//! Maps a native short error identifier to the host exception category it is
//! raised as. Seven static membership lists, one per non-default category,
//! are checked in a fixed order and the first match wins; identifiers absent
//! from every list are classified as [`ErrorCategory::Runtime`].
//!
//! The lists are folded once into a hash table on first use.
//!
//! Identifiers are matched with or without their `PREFIX(...)` wrapper, so
//! `LIB(ZEROVECTOR)` and `ZEROVECTOR` classify identically.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use star_ffi::strip_prefix;

use crate::error::ErrorCategory;

// ============================================================================
// Membership Lists
// ============================================================================

/// File, handle, open/read/write and data-coverage failures
static IO_ERRORS: &[&str] = &[
    "BADARCHTYPE",
    "BADFILEFORMAT",
    "BADFILENAME",
    "BADFILETYPE",
    "BLANKFILENAME",
    "BLANKFILETYPE",
    "CKINSUFFDATA",
    "CKNOCOVERAGE",
    "COVERAGEGAP",
    "DAFBEGGTEND",
    "DAFFRNOTFOUND",
    "DAFILLEGWRITE",
    "DAFNEGADDR",
    "DAFNOREAD",
    "DAFNOSEARCH",
    "DAFNOWRITE",
    "DAFOPENFAIL",
    "DAFREADFAIL",
    "DAFWRITEFAIL",
    "DASFILEREADFAILED",
    "DASFILEWRITEFAILED",
    "DASNOSUCHHANDLE",
    "DASOPENFAIL",
    "DASREADFAIL",
    "DASWRITEFAIL",
    "EKNOSEGMENTS",
    "FILEALREADYEXISTS",
    "FILECURRENTLYOPEN",
    "FILEDELETEFAILED",
    "FILEISNOTSPK",
    "FILENOTCONNECTED",
    "FILENOTFOUND",
    "FILENOTOPEN",
    "FILEOPENCONFLICT",
    "FILEOPENFAIL",
    "FILEOPENFAILED",
    "FILEREADFAILED",
    "FILETRUNCATED",
    "FILEWRITEFAILED",
    "INCOMPATIBLEARCH",
    "INQUIREERROR",
    "INQUIREFAILED",
    "INVALIDARCHTYPE",
    "IOERROR",
    "NOCURRENTARRAY",
    "NOLOADEDDSKFILES",
    "NOLOADEDFILES",
    "NOSUCHFILE",
    "NOSUCHHANDLE",
    "NOTADAFFILE",
    "NOTADASFILE",
    "NOTANEKFILE",
    "NOTATEXTFILE",
    "NOTCOVERED",
    "PCKINSUFFDATA",
    "READFAILED",
    "READFAILURE",
    "RECORDNOTFOUND",
    "SPKINSUFFDATA",
    "TOOMANYFILESOPEN",
    "UNKNOWNFILARC",
    "UNOPENEDFILE",
    "WRITEERROR",
    "WRITEFAILED",
];

/// Allocation failure and buffer, array, table or workspace overflow
static MEMORY_ERRORS: &[&str] = &[
    "ARRAYFULL",
    "ARRAYTOOSMALL",
    "BOUNDARYTOOBIG",
    "BUFFEROVERFLOW",
    "BUFFERTOOSMALL",
    "CELLTOOSMALL",
    "DAFFTFULL",
    "DASFTFULL",
    "FTFULL",
    "INSUFFICIENTDATA",
    "KERNELPOOLFULL",
    "MALLOCFAILED",
    "MALLOCFAILURE",
    "NOMOREROOM",
    "OUTOFMEMORY",
    "OUTOFROOM",
    "OUTPUTTOOSHORT",
    "SETEXCESS",
    "STRINGTOOSHORT",
    "STRINGTOOSMALL",
    "TABLEFULL",
    "TOOMANYFIELDS",
    "TOOMANYPEAKS",
    "TOOMANYWATCHES",
    "WINDOWEXCESS",
    "WINDOWTOOSMALL",
    "WORKSPACETOOSMALL",
];

/// Wrong variable or array type
static TYPE_ERRORS: &[&str] = &[
    "BADVARIABLETYPE",
    "INVALIDTYPE",
    "NOTANINTEGER",
    "NOTASEQUENCE",
    "READONLYBUFFER",
    "TYPEMISMATCH",
    "TYPENOTSUPPORTED",
    "WRONGARRAYTYPE",
    "WRONGDATATYPE",
];

/// Name or ID lookup failure
static KEY_ERRORS: &[&str] = &[
    "BODYIDNOTFOUND",
    "BODYNAMENOTFOUND",
    "FRAMEIDNOTFOUND",
    "FRAMEINFONOTFOUND",
    "FRAMENAMENOTFOUND",
    "IDCODENOTFOUND",
    "KERNELVARNOTFOUND",
    "NOFRAME",
    "NOSUCHSYMBOL",
    "NOTRANSLATION",
    "UNKNOWNBODY",
    "UNKNOWNFRAME",
    "UNKNOWNSYSTEM",
    "VARIABLENOTFOUND",
];

/// Out-of-range index
static INDEX_ERRORS: &[&str] = &[
    "BADSUBSCRIPT",
    "INDEXOUTOFRANGE",
    "INDEXTOOLARGE",
    "INDEXTOOSMALL",
    "INVALIDINDEX",
];

/// Literal divide-by-zero
static ZERO_DIVISION_ERRORS: &[&str] = &["DIVIDEBYZERO"];

/// Malformed input, inconsistent dimensions, out-of-domain values,
/// degenerate geometry and parse failures
static VALUE_ERRORS: &[&str] = &[
    "ALIASEDARGUMENT",
    "BADARRAYSHAPE",
    "BADAXIS",
    "BADAXISLENGTH",
    "BADAXISNUMBERS",
    "BADBORESIGHTSPEC",
    "BADBOUNDARY",
    "BADCATALOGFILE",
    "BADCOORDSYS",
    "BADDIMENSION",
    "BADDIMENSIONS",
    "BADDIRECTION",
    "BADECCENTRICITY",
    "BADENDPOINTS",
    "BADFRAMECLASS",
    "BADGM",
    "BADINITSTATE",
    "BADINPUTTYPE",
    "BADLATUSRECTUM",
    "BADLIMBLOCUSMIX",
    "BADPERIAPSEVALUE",
    "BADRADIUS",
    "BADRADIUSCOUNT",
    "BADREFVECTORSPEC",
    "BADSEMIAXIS",
    "BADTERMLOCUSMIX",
    "BADTIMESPEC",
    "BADTIMESTRING",
    "BADTIMETYPE",
    "BADVECTOR",
    "BADWINDOWSIZE",
    "BLANKSTRING",
    "BOGUSENTRY",
    "COORDSYSNOTREC",
    "DEGENERATECASE",
    "DEGENERATEINTERVAL",
    "DEGENERATESURFACE",
    "DEPENDENTVECTORS",
    "EMPTYSTRING",
    "ENDPOINTSMATCH",
    "INCOMPATIBLESCALE",
    "INCOMPATIBLEUNITS",
    "INCONSISTENTTIMES",
    "INPUTOUTOFBOUNDS",
    "INPUTSTOOLARGE",
    "INSUFFICIENTANGLES",
    "INTOUTOFRANGE",
    "INVALIDACTION",
    "INVALIDAXISLENGTH",
    "INVALIDBOUNDS",
    "INVALIDCARDINALITY",
    "INVALIDCOUNT",
    "INVALIDDIMENSION",
    "INVALIDECCENTRICITY",
    "INVALIDENDPNTSPEC",
    "INVALIDENDPOINTS",
    "INVALIDEPOCH",
    "INVALIDFORMAT",
    "INVALIDFOV",
    "INVALIDLIMBTYPE",
    "INVALIDLOCUS",
    "INVALIDMETHOD",
    "INVALIDOPTION",
    "INVALIDRADIUS",
    "INVALIDREFFRAME",
    "INVALIDSCALE",
    "INVALIDSHAPE",
    "INVALIDSIZE",
    "INVALIDSTATE",
    "INVALIDSTEPSIZE",
    "INVALIDTARGET",
    "INVALIDTERMTYPE",
    "INVALIDTIMEFORMAT",
    "INVALIDTIMESTRING",
    "INVALIDTOLERANCE",
    "INVALIDVALUE",
    "NEGATIVETOL",
    "NONCONICMOTION",
    "NONPOSITIVEMASS",
    "NONPOSITIVESCALE",
    "NONPOSITIVEVALUE",
    "NONUNITNORMAL",
    "NOTAROTATION",
    "NOTDISJOINT",
    "NOTONSURFACE",
    "NUMERICOVERFLOW",
    "ORBITDECAY",
    "RAYISZEROVECTOR",
    "SINGULARJACOBIAN",
    "TOOFEWINPUTLINES",
    "TOOFEWPLATES",
    "TOOFEWVERTICES",
    "UNITSNOTREC",
    "UNKNOWNCOMPARE",
    "UNMATCHENDPTS",
    "UNORDEREDTIMES",
    "UNPARSEDTIME",
    "UNRECOGNIZEDACTION",
    "VALUEOUTOFRANGE",
    "ZEROAXIS",
    "ZEROBORESIGHT",
    "ZEROLENGTH",
    "ZEROPOSITION",
    "ZEROQUATERNION",
    "ZEROSTEP",
    "ZEROVECTOR",
    "ZEROVELOCITY",
];

/// Membership lists in the order they are checked
static CLASSIFICATION_ORDER: [(ErrorCategory, &[&str]); 7] = [
    (ErrorCategory::Io, IO_ERRORS),
    (ErrorCategory::Memory, MEMORY_ERRORS),
    (ErrorCategory::Type, TYPE_ERRORS),
    (ErrorCategory::Key, KEY_ERRORS),
    (ErrorCategory::Index, INDEX_ERRORS),
    (ErrorCategory::ZeroDivision, ZERO_DIVISION_ERRORS),
    (ErrorCategory::Value, VALUE_ERRORS),
];

fn table() -> &'static FxHashMap<&'static str, ErrorCategory> {
    static TABLE: OnceLock<FxHashMap<&'static str, ErrorCategory>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = FxHashMap::default();
        for (category, identifiers) in CLASSIFICATION_ORDER.iter() {
            for id in identifiers.iter() {
                // first list wins
                table.entry(*id).or_insert(*category);
            }
        }
        table
    })
}

// ============================================================================
// Lookup
// ============================================================================

/// Classify a short error message such as `LIB(ZEROVECTOR)`.
pub fn classify(short: &str) -> ErrorCategory {
    table()
        .get(strip_prefix(short))
        .copied()
        .unwrap_or(ErrorCategory::Runtime)
}

/// Identifiers listed for a category. Runtime, the default, has none.
pub fn identifiers(category: ErrorCategory) -> &'static [&'static str] {
    CLASSIFICATION_ORDER
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, ids)| *ids)
        .unwrap_or(&[])
}

/// Number of distinct identifiers known to the classifier
pub fn known_count() -> usize {
    table().len()
}
