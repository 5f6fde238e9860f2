pub mod claims;
pub mod error;
pub mod localpart;
pub mod template;

pub use claims::{ClaimPath, ClaimStore, PathSegment, scalar_to_string, value_kind};
pub use error::{ClaimsError, PathError, PathErrorReason, PathSyntaxError, PathSyntaxErrorKind};
pub use localpart::{
    MAX_LOCALPART_LENGTH, is_valid_localpart, normalize_localpart, normalize_localpart_with_limit,
};
pub use template::{Filter, ROOT_BINDING, RenderError, Template, TemplateError, TemplateErrorKind};
