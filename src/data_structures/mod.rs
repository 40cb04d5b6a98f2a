//! Engine data structures: scene graph, batching layout, and the types they share.
//!
//! - `instance` holds per-instance transformation data and the records the culling pass reads
//! - `bounding` contains the bounding volumes of nodes and objects
//! - `model` contains mesh and material definitions
//! - `scene_graph` enables hierarchical scene organization
//! - `aggregate` counts instances per distinct mesh
//! - `multi_instance` lays out one batch of indirect draw commands
//! - `terrain` holds the height field animation nodes stand on

pub mod aggregate;
pub mod bounding;
pub mod instance;
pub mod model;
pub mod multi_instance;
pub mod scene_graph;
pub mod terrain;
