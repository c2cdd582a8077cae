//! Node/device bookkeeping and the finalize protocol that assigns the
//! global variable index space.

use crate::device::Device;
use crate::error::CircuitError;

/// Maximum stored node-name length.
/// Longer names are truncated at the UTF-8 char boundary nearest the
/// limit rather than rejected — `add_node` is total, and a truncated
/// display name has no bearing on simulation correctness.
const MAX_NODE_NAME_LEN: usize = 63;

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NODE_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_NODE_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

fn is_ground_alias(name: &str) -> bool {
    matches!(name.to_ascii_lowercase().as_str(), "0" | "gnd" | "ground")
}

/// A circuit node. `var_index` is `-1` until `finalize` assigns it (ground
/// is permanently `-1`).
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub var_index: i64,
}

/// Owns the ordered nodes and devices of one circuit and coordinates
/// `finalize`, which assigns the global MNA variable index space.
#[derive(Debug, Clone)]
pub struct Circuit {
    nodes: Vec<Node>,
    devices: Vec<Device>,
    num_vars: usize,
    num_extra_vars: usize,
    finalized: bool,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    /// Creates an empty circuit with node 0 pre-populated as ground.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: "0".to_string(),
                var_index: -1,
            }],
            devices: Vec::new(),
            num_vars: 0,
            num_extra_vars: 0,
            finalized: false,
        }
    }

    /// Adds a node by name, idempotently. Ground aliases (`"0"`, `"gnd"`,
    /// `"ground"`, case-insensitive) always resolve to node 0. Rejected
    /// after `finalize`.
    pub fn add_node(&mut self, name: &str) -> Result<usize, CircuitError> {
        if self.finalized {
            return Err(CircuitError::AlreadyFinalized);
        }
        if is_ground_alias(name) {
            return Ok(0);
        }
        if let Some(idx) = self.nodes.iter().position(|n| n.name == name) {
            return Ok(idx);
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: truncate_name(name),
            var_index: -1,
        });
        Ok(idx)
    }

    /// Looks up a node by name.
    pub fn get_node(&self, name: &str) -> Option<usize> {
        if is_ground_alias(name) {
            return Some(0);
        }
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Returns the variable index assigned to a node (valid only after
    /// `finalize`); `-1` for ground.
    pub fn get_var_index(&self, node_idx: usize) -> Option<i64> {
        self.nodes.get(node_idx).map(|n| n.var_index)
    }

    /// Appends a device. Rejected after `finalize`.
    pub fn add_device(&mut self, device: Device) -> Result<(), CircuitError> {
        if self.finalized {
            return Err(CircuitError::AlreadyFinalized);
        }
        self.devices.push(device);
        Ok(())
    }

    /// Borrows the devices in insertion order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Mutably borrows the devices in insertion order (used by the NR
    /// driver's `update_state` pass).
    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    /// Borrows the nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Total variable count after `finalize` (0 before).
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// Extra (branch-current) variable count after `finalize`.
    pub fn num_extra_vars(&self) -> usize {
        self.num_extra_vars
    }

    /// Whether `finalize` has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Assigns variable indices to non-ground nodes, runs each device's
    /// `init` hook (granting extra-variable allocation requests), and
    /// rewrites every device's terminal references from node indices to
    /// variable indices. There is exactly one code path that ever
    /// populates a `Device`'s `nodes` field with variable indices.
    pub fn finalize(&mut self) -> Result<(), CircuitError> {
        if self.finalized {
            return Err(CircuitError::AlreadyFinalized);
        }
        let num_non_ground = self.nodes.len() - 1;
        if num_non_ground == 0 {
            return Err(CircuitError::NoVariables);
        }

        let mut next_var = 0i64;
        for node in self.nodes.iter_mut().skip(1) {
            node.var_index = next_var;
            next_var += 1;
        }
        self.num_vars = num_non_ground;

        let mut num_extra = 0usize;
        for device in &mut self.devices {
            device.init();
            if device.extra_var.is_requested() {
                let idx = self.num_vars + num_extra;
                device.extra_var = crate::device::ExtraVar::Allocated(idx);
                num_extra += 1;
            }
        }
        self.num_extra_vars = num_extra;
        self.num_vars += num_extra;

        for device in &mut self.devices {
            for terminal in device.nodes.iter_mut() {
                let node_idx = usize::try_from(*terminal).expect("node index is non-negative");
                *terminal = self.nodes[node_idx].var_index;
            }
        }

        self.finalized = true;
        log::debug!(
            "circuit finalized: {} nodes, {} devices, {} vars ({} extra)",
            self.nodes.len(),
            self.devices.len(),
            self.num_vars,
            self.num_extra_vars
        );
        Ok(())
    }
}
