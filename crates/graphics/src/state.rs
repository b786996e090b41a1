use crate::GraphicsError;
use crate::descriptors::ResourceState;

/// Reject transitions that no backend can express: combining a write state
/// with anything else, and transitions that change nothing.
pub fn validate_transition(
    before: ResourceState,
    after: ResourceState,
) -> Result<(), GraphicsError> {
    if after.is_empty() || before == after {
        return Err(GraphicsError::InvalidTransition { before, after });
    }
    for state in [before, after] {
        if state.is_write() && state.bits().count_ones() > 1 {
            return Err(GraphicsError::InvalidTransition { before, after });
        }
    }
    Ok(())
}

/// Whether a resource in `state` may be read by a shader.
pub fn is_shader_readable(state: ResourceState) -> bool {
    state.intersects(ResourceState::SHADER_READ | ResourceState::DEPTHSTENCIL_READONLY)
}
