//! The frame as a pass graph. Both executors run the schedule built here,
//! so the ordering between motion, assignment, geometry and lighting is
//! declared once and checked by `PassGraph::compile`.

use froxel_core::{PassGraph, PassGraphError, PassNode, ResourceId, Schedule};

pub const LIGHT_SET: ResourceId = ResourceId("light_set");
pub const CAMERA: ResourceId = ResourceId("camera");
pub const CLUSTER_RECORDS: ResourceId = ResourceId("cluster_records");
pub const SCENE: ResourceId = ResourceId("scene");
pub const GBUFFER: ResourceId = ResourceId("gbuffer");
pub const FRAME_OUTPUT: ResourceId = ResourceId("frame_output");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePass {
    MoveLights,
    AssignClusters,
    Geometry,
    Lighting,
}

pub fn build_frame_schedule() -> Result<Schedule<FramePass>, PassGraphError> {
    let mut graph = PassGraph::new();

    let move_lights =
        graph.add_pass(PassNode::new("move_lights", FramePass::MoveLights).writes(LIGHT_SET));
    let assign = graph.add_pass(
        PassNode::new("assign_clusters", FramePass::AssignClusters)
            .reads(LIGHT_SET)
            .reads(CAMERA)
            .writes(CLUSTER_RECORDS)
            .after(move_lights),
    );
    let geometry = graph.add_pass(
        PassNode::new("geometry", FramePass::Geometry)
            .reads(SCENE)
            .reads(CAMERA)
            .writes(GBUFFER),
    );
    graph.add_pass(
        PassNode::new("lighting", FramePass::Lighting)
            .reads(GBUFFER)
            .reads(CLUSTER_RECORDS)
            .reads(LIGHT_SET)
            .reads(CAMERA)
            .writes(FRAME_OUTPUT)
            .after(assign)
            .after(geometry),
    );

    graph.compile()
}
