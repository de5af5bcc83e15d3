use thiserror::Error;

/// Rejections while reading an embedded plugin descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
	#[error("plugin built for ABI v{actual}, host speaks v{expected}")]
	AbiMismatch { expected: u32, actual: u32 },
	#[error("plugin metadata has an empty name")]
	MissingName,
	#[error("plugin metadata field '{0}' is not valid UTF-8")]
	InvalidUtf8(&'static str),
}

/// Rejections while validating a lifecycle operation table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
	#[error("lifecycle table too small: {actual} bytes, need {expected}")]
	StructSize { expected: usize, actual: usize },
	#[error("lifecycle table is ABI v{actual}, host speaks v{expected}")]
	AbiMismatch { expected: u32, actual: u32 },
	#[error("lifecycle table has a null instance")]
	NullInstance,
	#[error("lifecycle table lacks the '{0}' operation")]
	MissingOperation(&'static str),
}
