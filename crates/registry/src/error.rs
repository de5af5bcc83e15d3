/// Lookup failures reported by [`TypedView`](crate::TypedView) and the
/// named-instance table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
	/// No creator for `type_key` is registered under `base_key`.
	#[error("no implementation '{type_key}' registered for '{base_key}'")]
	NotFound { base_key: String, type_key: String },
	/// A named instance exists but was created as another type.
	#[error("instance '{key}' is not a {expected}")]
	InstanceType { key: String, expected: &'static str },
}
