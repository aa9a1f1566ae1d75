//! Node placement and link properties.

use hashbrown::HashMap;
use ringrange::{NodeId, SPEED_OF_LIGHT};

/// Antenna position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in metres.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Properties of the radio path between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Probability that a frame never arrives (0.0 to 1.0).
    loss_rate: f64,
    /// Probability that a frame arrives but fails its checksum.
    corruption_rate: f64,
    /// Whether the link is currently usable.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.set_loss_rate(rate);
        self
    }

    pub fn with_corruption_rate(mut self, rate: f64) -> Self {
        self.set_corruption_rate(rate);
        self
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    pub fn corruption_rate(&self) -> f64 {
        self.corruption_rate
    }

    pub fn set_loss_rate(&mut self, rate: f64) {
        self.loss_rate = probability(rate);
    }

    pub fn set_corruption_rate(&mut self, rate: f64) {
        self.corruption_rate = probability(rate);
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Clamp to `[0, 1]`; NaN counts as never.
fn probability(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// Where the nodes are and which pairs can hear each other.
///
/// Every pair starts with a default link. Links are symmetric.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Indexed by node id.
    positions: Vec<Position>,
    links: HashMap<(NodeId, NodeId), Link>,
}

impl Topology {
    /// Place nodes at the given positions, all pairs linked.
    pub fn new(positions: Vec<Position>) -> Self {
        let n = positions.len();
        let mut links = HashMap::new();
        for a in 0..n {
            for b in (a + 1)..n {
                links.insert((a as NodeId, b as NodeId), Link::default());
            }
        }
        Self { positions, links }
    }

    /// Nodes on the x axis, `spacing` metres apart.
    pub fn line(num_nodes: usize, spacing: f64) -> Self {
        Self::new(
            (0..num_nodes)
                .map(|i| Position::new(i as f64 * spacing, 0.0, 0.0))
                .collect(),
        )
    }

    /// Nodes on a grid filled row by row.
    pub fn grid(num_nodes: usize, columns: usize, spacing: f64) -> Self {
        let columns = columns.max(1);
        Self::new(
            (0..num_nodes)
                .map(|i| {
                    let col = (i % columns) as f64;
                    let row = (i / columns) as f64;
                    Position::new(col * spacing, row * spacing, 0.0)
                })
                .collect(),
        )
    }

    pub fn num_nodes(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, node: NodeId) -> Option<Position> {
        self.positions.get(node as usize).copied()
    }

    /// Move a node. Returns false for an unknown id.
    pub fn set_position(&mut self, node: NodeId, position: Position) -> bool {
        match self.positions.get_mut(node as usize) {
            Some(p) => {
                *p = position;
                true
            }
            None => false,
        }
    }

    /// True distance between two nodes in metres.
    pub fn distance(&self, a: NodeId, b: NodeId) -> Option<f64> {
        Some(self.position(a)?.distance_to(&self.position(b)?))
    }

    /// One-way time of flight in picoseconds.
    pub fn propagation_ps(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.distance(a, b).map(|d| d / SPEED_OF_LIGHT * 1e12)
    }

    /// Add or replace the link between two nodes.
    pub fn add_link(&mut self, a: NodeId, b: NodeId, link: Link) {
        self.links.insert(Self::canonical_pair(a, b), link);
    }

    /// Remove a link entirely.
    pub fn remove_link(&mut self, a: NodeId, b: NodeId) -> Option<Link> {
        self.links.remove(&Self::canonical_pair(a, b))
    }

    pub fn get_link(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.links.get(&Self::canonical_pair(a, b))
    }

    pub fn get_link_mut(&mut self, a: NodeId, b: NodeId) -> Option<&mut Link> {
        self.links.get_mut(&Self::canonical_pair(a, b))
    }

    /// Check if two nodes can hear each other (link exists and is active).
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes reachable from `node` over active links, in ascending order.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| match node {
                n if n == a => Some(b),
                n if n == b => Some(a),
                _ => None,
            })
            .collect();
        // Map order is not stable across runs; RNG draws must be.
        result.sort_unstable();
        result
    }

    /// Disable all links crossing between groups.
    ///
    /// Nodes missing from every group form one extra group of their own.
    pub fn partition(&mut self, groups: &[Vec<NodeId>]) {
        for (&(a, b), link) in self.links.iter_mut() {
            let a_group = groups.iter().position(|g| g.contains(&a));
            let b_group = groups.iter().position(|g| g.contains(&b));
            if a_group != b_group {
                link.active = false;
            }
        }
    }

    /// Re-enable all links.
    pub fn heal(&mut self) {
        for link in self.links.values_mut() {
            link.active = true;
        }
    }

    pub fn set_global_loss_rate(&mut self, rate: f64) {
        for link in self.links.values_mut() {
            link.set_loss_rate(rate);
        }
    }

    pub fn set_global_corruption_rate(&mut self, rate: f64) {
        for link in self.links.values_mut() {
            link.set_corruption_rate(rate);
        }
    }

    fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_positions_and_links() {
        let topo = Topology::line(3, 2.5);
        assert_eq!(topo.num_nodes(), 3);
        assert_eq!(topo.distance(0, 2), Some(5.0));
        assert!(topo.is_connected(0, 1));
        assert!(topo.is_connected(2, 0));
        assert!(topo.get_link(0, 3).is_none());
    }

    #[test]
    fn test_grid_fills_rows() {
        let topo = Topology::grid(4, 2, 3.0);
        assert_eq!(topo.position(1), Some(Position::new(3.0, 0.0, 0.0)));
        assert_eq!(topo.position(2), Some(Position::new(0.0, 3.0, 0.0)));
        // Diagonal of a 3 m square
        let d = topo.distance(0, 3).unwrap();
        assert!((d - 18.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_propagation_time() {
        let topo = Topology::line(2, SPEED_OF_LIGHT * 1e-9);
        // One nanosecond of flight
        let ps = topo.propagation_ps(0, 1).unwrap();
        assert!((ps - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_partition_and_heal() {
        let mut topo = Topology::line(4, 1.0);
        topo.partition(&[vec![0, 1], vec![2, 3]]);

        assert!(topo.is_connected(0, 1));
        assert!(topo.is_connected(2, 3));
        assert!(!topo.is_connected(0, 2));
        assert!(!topo.is_connected(1, 3));

        topo.heal();
        assert!(topo.is_connected(0, 2));
    }

    #[test]
    fn test_neighbors_sorted() {
        let mut topo = Topology::line(5, 1.0);
        topo.get_link_mut(2, 3).unwrap().active = false;
        assert_eq!(topo.neighbors(2), vec![0, 1, 4]);
    }

    #[test]
    fn test_move_node() {
        let mut topo = Topology::line(2, 1.0);
        assert!(topo.set_position(1, Position::new(0.0, 4.0, 3.0)));
        assert_eq!(topo.distance(0, 1), Some(5.0));
        assert!(!topo.set_position(7, Position::default()));
    }

    #[test]
    fn test_link_rates_clamped() {
        let link = Link::new().with_loss_rate(1.5).with_corruption_rate(-0.2);
        assert_eq!(link.loss_rate(), 1.0);
        assert_eq!(link.corruption_rate(), 0.0);

        let mut topo = Topology::line(3, 1.0);
        topo.set_global_loss_rate(0.25);
        assert_eq!(topo.get_link(1, 2).unwrap().loss_rate(), 0.25);
        topo.get_link_mut(0, 1).unwrap().set_corruption_rate(f64::NAN);
        assert_eq!(topo.get_link(0, 1).unwrap().corruption_rate(), 0.0);
        topo.get_link_mut(0, 1).unwrap().set_loss_rate(7.0);
        assert_eq!(topo.get_link(0, 1).unwrap().loss_rate(), 1.0);
        topo.remove_link(1, 2);
        assert!(!topo.is_connected(1, 2));
    }
}
