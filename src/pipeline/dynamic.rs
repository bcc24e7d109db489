// Dynamic state bookkeeping
//
// Library parts may only declare the dynamic states that belong to the
// phases they carry, so the caller's set is partitioned with one table per
// phase. Some states legitimately appear in more than one table.

use super::state::SetupState;
use ash::vk;
use std::collections::BTreeSet;

const VERTEX_INPUT_STATES: &[vk::DynamicState] = &[
    vk::DynamicState::VERTEX_INPUT_BINDING_STRIDE,
    vk::DynamicState::VERTEX_INPUT_EXT,
    vk::DynamicState::PRIMITIVE_TOPOLOGY,
    vk::DynamicState::PRIMITIVE_RESTART_ENABLE,
];

const PRE_RASTERIZATION_STATES: &[vk::DynamicState] = &[
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::VIEWPORT_WITH_COUNT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::SCISSOR_WITH_COUNT,
    vk::DynamicState::LINE_WIDTH,
    vk::DynamicState::LINE_STIPPLE_EXT,
    vk::DynamicState::CULL_MODE,
    vk::DynamicState::FRONT_FACE,
    vk::DynamicState::PATCH_CONTROL_POINTS_EXT,
    vk::DynamicState::RASTERIZER_DISCARD_ENABLE,
    vk::DynamicState::DISCARD_RECTANGLE_EXT,
    vk::DynamicState::DEPTH_BIAS,
    vk::DynamicState::DEPTH_BIAS_ENABLE,
    vk::DynamicState::FRAGMENT_SHADING_RATE_KHR,
    vk::DynamicState::TESSELLATION_DOMAIN_ORIGIN_EXT,
    vk::DynamicState::DEPTH_CLAMP_ENABLE_EXT,
    vk::DynamicState::POLYGON_MODE_EXT,
    vk::DynamicState::RASTERIZATION_STREAM_EXT,
    vk::DynamicState::PROVOKING_VERTEX_MODE_EXT,
    vk::DynamicState::DEPTH_CLIP_NEGATIVE_ONE_TO_ONE_EXT,
    vk::DynamicState::DEPTH_CLIP_ENABLE_EXT,
    vk::DynamicState::LINE_STIPPLE_ENABLE_EXT,
    vk::DynamicState::CONSERVATIVE_RASTERIZATION_MODE_EXT,
    vk::DynamicState::EXTRA_PRIMITIVE_OVERESTIMATION_SIZE_EXT,
    vk::DynamicState::LINE_RASTERIZATION_MODE_EXT,
    vk::DynamicState::VIEWPORT_SWIZZLE_NV,
    vk::DynamicState::SHADING_RATE_IMAGE_ENABLE_NV,
    vk::DynamicState::VIEWPORT_W_SCALING_ENABLE_NV,
    vk::DynamicState::VIEWPORT_W_SCALING_NV,
    vk::DynamicState::VIEWPORT_SHADING_RATE_PALETTE_NV,
    vk::DynamicState::VIEWPORT_COARSE_SAMPLE_ORDER_NV,
    vk::DynamicState::EXCLUSIVE_SCISSOR_NV,
];

const FRAGMENT_SHADER_STATES: &[vk::DynamicState] = &[
    vk::DynamicState::DEPTH_BOUNDS,
    vk::DynamicState::DEPTH_TEST_ENABLE,
    vk::DynamicState::DEPTH_WRITE_ENABLE,
    vk::DynamicState::DEPTH_COMPARE_OP,
    vk::DynamicState::DEPTH_BOUNDS_TEST_ENABLE,
    vk::DynamicState::STENCIL_COMPARE_MASK,
    vk::DynamicState::STENCIL_WRITE_MASK,
    vk::DynamicState::STENCIL_REFERENCE,
    vk::DynamicState::STENCIL_TEST_ENABLE,
    vk::DynamicState::STENCIL_OP,
    vk::DynamicState::FRAGMENT_SHADING_RATE_KHR,
    // Needs MSAA info here as well as in fragment output state
    vk::DynamicState::SAMPLE_LOCATIONS_EXT,
    vk::DynamicState::SAMPLE_MASK_EXT,
    vk::DynamicState::ALPHA_TO_COVERAGE_ENABLE_EXT,
    vk::DynamicState::ALPHA_TO_ONE_ENABLE_EXT,
    vk::DynamicState::SAMPLE_LOCATIONS_ENABLE_EXT,
    vk::DynamicState::RASTERIZATION_SAMPLES_EXT,
    vk::DynamicState::COVERAGE_TO_COLOR_ENABLE_NV,
    vk::DynamicState::COVERAGE_TO_COLOR_LOCATION_NV,
    vk::DynamicState::COVERAGE_MODULATION_MODE_NV,
    vk::DynamicState::COVERAGE_MODULATION_TABLE_ENABLE_NV,
    vk::DynamicState::COVERAGE_MODULATION_TABLE_NV,
    vk::DynamicState::COVERAGE_REDUCTION_MODE_NV,
    vk::DynamicState::REPRESENTATIVE_FRAGMENT_TEST_ENABLE_NV,
];

const FRAGMENT_OUTPUT_STATES: &[vk::DynamicState] = &[
    vk::DynamicState::LOGIC_OP_EXT,
    vk::DynamicState::BLEND_CONSTANTS,
    vk::DynamicState::COLOR_WRITE_ENABLE_EXT,
    vk::DynamicState::FRAGMENT_SHADING_RATE_KHR,
    vk::DynamicState::SAMPLE_LOCATIONS_EXT,
    vk::DynamicState::COLOR_WRITE_MASK_EXT,
    vk::DynamicState::COLOR_BLEND_ENABLE_EXT,
    vk::DynamicState::COLOR_BLEND_ADVANCED_EXT,
    vk::DynamicState::COLOR_BLEND_EQUATION_EXT,
    vk::DynamicState::LOGIC_OP_ENABLE_EXT,
    vk::DynamicState::SAMPLE_MASK_EXT,
    vk::DynamicState::ALPHA_TO_COVERAGE_ENABLE_EXT,
    vk::DynamicState::ALPHA_TO_ONE_ENABLE_EXT,
    vk::DynamicState::SAMPLE_LOCATIONS_ENABLE_EXT,
    vk::DynamicState::RASTERIZATION_SAMPLES_EXT,
    vk::DynamicState::COVERAGE_TO_COLOR_ENABLE_NV,
    vk::DynamicState::COVERAGE_TO_COLOR_LOCATION_NV,
    vk::DynamicState::COVERAGE_MODULATION_MODE_NV,
    vk::DynamicState::COVERAGE_MODULATION_TABLE_ENABLE_NV,
    vk::DynamicState::COVERAGE_MODULATION_TABLE_NV,
    vk::DynamicState::COVERAGE_REDUCTION_MODE_NV,
    vk::DynamicState::REPRESENTATIVE_FRAGMENT_TEST_ENABLE_NV,
    vk::DynamicState::ATTACHMENT_FEEDBACK_LOOP_ENABLE_EXT,
];

/// States the caller defers to draw time.
#[derive(Debug, Clone, Default)]
pub struct DynamicStateSet {
    states: BTreeSet<vk::DynamicState>,
}

impl DynamicStateSet {
    /// Panics if a state is not known to any phase; it would silently be
    /// dropped from every library part otherwise.
    pub fn new(states: &[vk::DynamicState]) -> Self {
        for state in states {
            assert!(
                phase_tables().iter().any(|(_, table)| table.contains(state)),
                "dynamic state {:?} does not belong to any pipeline phase",
                state
            );
        }
        Self {
            states: states.iter().copied().collect(),
        }
    }

    pub fn contains(&self, state: vk::DynamicState) -> bool {
        self.states.contains(&state)
    }

    pub fn contains_any(&self, states: &[vk::DynamicState]) -> bool {
        states.iter().any(|s| self.contains(*s))
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Every declared state, in stable order
    pub fn all(&self) -> Vec<vk::DynamicState> {
        self.states.iter().copied().collect()
    }

    /// Declared states relevant to the phases in `setup_state`.
    pub fn for_phases(&self, setup_state: SetupState) -> Vec<vk::DynamicState> {
        let mut picked = BTreeSet::new();
        for (phase, table) in phase_tables() {
            if setup_state.contains(phase) {
                picked.extend(table.iter().filter(|s| self.states.contains(*s)).copied());
            }
        }
        picked.into_iter().collect()
    }
}

fn phase_tables() -> [(SetupState, &'static [vk::DynamicState]); 4] {
    [
        (SetupState::VERTEX_INPUT_INTERFACE, VERTEX_INPUT_STATES),
        (SetupState::PRE_RASTERIZATION_SHADERS, PRE_RASTERIZATION_STATES),
        (SetupState::FRAGMENT_SHADER, FRAGMENT_SHADER_STATES),
        (SetupState::FRAGMENT_OUTPUT_INTERFACE, FRAGMENT_OUTPUT_STATES),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_by_phase() {
        let set = DynamicStateSet::new(&[
            vk::DynamicState::PRIMITIVE_TOPOLOGY,
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::STENCIL_REFERENCE,
            vk::DynamicState::BLEND_CONSTANTS,
        ]);

        assert_eq!(
            set.for_phases(SetupState::VERTEX_INPUT_INTERFACE),
            vec![vk::DynamicState::PRIMITIVE_TOPOLOGY]
        );
        assert_eq!(
            set.for_phases(SetupState::FRAGMENT_OUTPUT_INTERFACE),
            vec![vk::DynamicState::BLEND_CONSTANTS]
        );
        assert_eq!(
            set.for_phases(SetupState::ALL).len(),
            4,
        );
    }

    #[test]
    fn shared_states_land_in_every_owning_part() {
        let set = DynamicStateSet::new(&[vk::DynamicState::FRAGMENT_SHADING_RATE_KHR]);
        for phase in [
            SetupState::PRE_RASTERIZATION_SHADERS,
            SetupState::FRAGMENT_SHADER,
            SetupState::FRAGMENT_OUTPUT_INTERFACE,
        ] {
            assert_eq!(set.for_phases(phase), vec![vk::DynamicState::FRAGMENT_SHADING_RATE_KHR]);
        }
        assert!(set.for_phases(SetupState::VERTEX_INPUT_INTERFACE).is_empty());
    }

    #[test]
    fn vendor_states_partition_like_their_core_neighbours() {
        let set = DynamicStateSet::new(&[
            vk::DynamicState::VIEWPORT_SWIZZLE_NV,
            vk::DynamicState::EXCLUSIVE_SCISSOR_NV,
            vk::DynamicState::COVERAGE_REDUCTION_MODE_NV,
            vk::DynamicState::ATTACHMENT_FEEDBACK_LOOP_ENABLE_EXT,
        ]);

        assert!(set.for_phases(SetupState::VERTEX_INPUT_INTERFACE).is_empty());
        assert_eq!(
            set.for_phases(SetupState::PRE_RASTERIZATION_SHADERS),
            vec![vk::DynamicState::VIEWPORT_SWIZZLE_NV, vk::DynamicState::EXCLUSIVE_SCISSOR_NV]
        );
        assert_eq!(
            set.for_phases(SetupState::FRAGMENT_SHADER),
            vec![vk::DynamicState::COVERAGE_REDUCTION_MODE_NV]
        );
        let output = set.for_phases(SetupState::FRAGMENT_OUTPUT_INTERFACE);
        assert!(output.contains(&vk::DynamicState::COVERAGE_REDUCTION_MODE_NV));
        assert!(output.contains(&vk::DynamicState::ATTACHMENT_FEEDBACK_LOOP_ENABLE_EXT));
        assert_eq!(output.len(), 2);
    }

    #[test]
    #[should_panic(expected = "does not belong to any pipeline phase")]
    fn unknown_state_is_rejected() {
        DynamicStateSet::new(&[vk::DynamicState::RAY_TRACING_PIPELINE_STACK_SIZE_KHR]);
    }
}
