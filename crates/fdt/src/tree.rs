use arena::EternalArena;

use crate::header::{read_be32, FdtHeader};
use crate::tokens::{FdtToken, TokenScanner};
use crate::FdtError;

// TODO: derive the memory node's unit address from #address-cells instead of
// assuming the qemu-virt layout.
const MEMORY_NODE: &str = "memory@80000000";
const REG_PROPERTY: &str = "reg";

/// Index of a node in the arena-owned node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a property in the arena-owned property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropId(u32);

impl PropId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A device-tree node. The name is borrowed from the blob; all links are
/// indices into the tables owned by [`DeviceTree`], never freed on their own.
///
/// Children and properties hang off sibling chains, so a node can carry any
/// number of either without a compile-time cap.
#[derive(Clone, Copy)]
pub struct FdtNode {
    pub name: &'static str,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    first_prop: Option<PropId>,
    last_prop: Option<PropId>,
}

impl FdtNode {
    const EMPTY: FdtNode = FdtNode {
        name: "",
        parent: None,
        first_child: None,
        last_child: None,
        next_sibling: None,
        first_prop: None,
        last_prop: None,
    };

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// A property: name resolved through the strings block, value borrowed
/// straight from the blob.
#[derive(Clone, Copy)]
pub struct FdtProperty {
    pub name: &'static str,
    pub value: &'static [u8],
    next: Option<PropId>,
}

impl FdtProperty {
    const EMPTY: FdtProperty = FdtProperty {
        name: "",
        value: &[],
        next: None,
    };
}

/// The parsed tree. Built in one shot at boot, read-only afterwards.
pub struct DeviceTree {
    nodes: &'static mut [FdtNode],
    properties: &'static mut [FdtProperty],
    root: NodeId,
}

impl DeviceTree {
    /// Validates and parses `blob`, taking node and property storage from
    /// `arena`. The first pass walks the whole token stream before anything
    /// is allocated, so a rejected blob costs zero arena bytes.
    pub fn parse(blob: &'static [u8], arena: &mut EternalArena) -> Result<Self, FdtError> {
        let header = FdtHeader::read(blob)?;
        let struct_block = block(blob, header.off_dt_struct, header.size_dt_struct)?;
        let strings_block = block(blob, header.off_dt_strings, header.size_dt_strings)?;

        let (node_count, prop_count) = survey(struct_block, strings_block)?;

        let nodes = arena.allocate_slice(node_count, FdtNode::EMPTY);
        let properties = arena.allocate_slice(prop_count, FdtProperty::EMPTY);

        let mut scanner = TokenScanner::new(struct_block);
        let mut current: Option<NodeId> = None;
        let mut root: Option<NodeId> = None;
        let mut next_node = 0usize;
        let mut next_prop = 0usize;

        loop {
            match scanner.next_token()? {
                FdtToken::BeginNode { name } => {
                    let id = NodeId(next_node as u32);
                    nodes[next_node] = FdtNode {
                        name,
                        parent: current,
                        ..FdtNode::EMPTY
                    };
                    next_node += 1;

                    match current {
                        Some(parent) => append_child(nodes, parent, id),
                        // The unique root: zero-length name, no parent.
                        None => root = Some(id),
                    }
                    current = Some(id);
                }
                FdtToken::EndNode => {
                    current = match current {
                        Some(id) => nodes[id.index()].parent,
                        None => return Err(FdtError::UnbalancedTree),
                    };
                }
                FdtToken::Prop { name_offset, value } => {
                    let owner = current.ok_or(FdtError::UnbalancedTree)?;
                    let name = read_string(strings_block, name_offset)?;

                    let id = PropId(next_prop as u32);
                    properties[next_prop] = FdtProperty {
                        name,
                        value,
                        next: None,
                    };
                    next_prop += 1;

                    append_property(nodes, properties, owner, id);
                }
                FdtToken::Nop => {}
                FdtToken::End => break,
            }
        }

        let root = root.ok_or(FdtError::UnbalancedTree)?;
        Ok(Self {
            nodes,
            properties,
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &FdtNode {
        &self.nodes[id.index()]
    }

    pub fn property(&self, id: PropId) -> &FdtProperty {
        &self.properties[id.index()]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.node(id).first_child;
        core::iter::from_fn(move || {
            let id = next?;
            next = self.node(id).next_sibling;
            Some(id)
        })
    }

    pub fn properties(&self, id: NodeId) -> impl Iterator<Item = &FdtProperty> + '_ {
        let mut next = self.node(id).first_prop;
        core::iter::from_fn(move || {
            let prop = self.property(next?);
            next = prop.next;
            Some(prop)
        })
    }

    /// First direct child of `parent` with the given name, if any.
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent).find(|&c| self.node(c).name == name)
    }

    /// First property of `node` with the given name, if any.
    pub fn find_property(&self, node: NodeId, name: &str) -> Option<&FdtProperty> {
        self.properties(node).find(|p| p.name == name)
    }

    /// Installed RAM in bytes: the low size word of the memory node's `reg`
    /// property. Only the low 32 bits are honored, so reports cap at 4 GiB.
    /// Returns 0 when the node or the property is missing.
    pub fn memory_size(&self) -> usize {
        let memory = match self.find_child(self.root, MEMORY_NODE) {
            Some(node) => node,
            None => return 0,
        };
        let reg = match self.find_property(memory, REG_PROPERTY) {
            Some(prop) => prop,
            None => return 0,
        };

        // reg is one (address, size) pair of 64-bit cells; bytes 12..16 are
        // the low word of the size.
        match read_be32(reg.value, 12) {
            Some(size) => size as usize,
            None => 0,
        }
    }
}

fn block(blob: &'static [u8], offset: u32, size: u32) -> Result<&'static [u8], FdtError> {
    let start = offset as usize;
    let end = start.checked_add(size as usize).ok_or(FdtError::Truncated)?;
    blob.get(start..end).ok_or(FdtError::Truncated)
}

/// First parse pass: validates the token stream (balanced begin/end tokens,
/// a single zero-length-named root, properties only inside nodes, resolvable
/// names) and counts how much table storage the second pass needs.
fn survey(struct_block: &'static [u8], strings_block: &'static [u8]) -> Result<(usize, usize), FdtError> {
    let mut scanner = TokenScanner::new(struct_block);
    let mut depth = 0usize;
    let mut nodes = 0usize;
    let mut props = 0usize;
    let mut seen_root = false;

    loop {
        match scanner.next_token()? {
            FdtToken::BeginNode { name } => {
                if depth == 0 {
                    if seen_root || !name.is_empty() {
                        return Err(FdtError::UnbalancedTree);
                    }
                    seen_root = true;
                }
                depth += 1;
                nodes += 1;
            }
            FdtToken::EndNode => {
                depth = depth.checked_sub(1).ok_or(FdtError::UnbalancedTree)?;
            }
            FdtToken::Prop { name_offset, .. } => {
                if depth == 0 {
                    return Err(FdtError::UnbalancedTree);
                }
                read_string(strings_block, name_offset)?;
                props += 1;
            }
            FdtToken::Nop => {}
            FdtToken::End => break,
        }
    }

    if !seen_root || depth != 0 {
        return Err(FdtError::UnbalancedTree);
    }
    Ok((nodes, props))
}

fn read_string(strings: &'static [u8], offset: usize) -> Result<&'static str, FdtError> {
    let tail = strings.get(offset..).ok_or(FdtError::Truncated)?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(FdtError::MalformedName)?;
    core::str::from_utf8(&tail[..len]).map_err(|_| FdtError::MalformedName)
}

fn append_child(nodes: &mut [FdtNode], parent: NodeId, child: NodeId) {
    match nodes[parent.index()].last_child {
        Some(prev) => nodes[prev.index()].next_sibling = Some(child),
        None => nodes[parent.index()].first_child = Some(child),
    }
    nodes[parent.index()].last_child = Some(child);
}

fn append_property(nodes: &mut [FdtNode], properties: &mut [FdtProperty], owner: NodeId, prop: PropId) {
    match nodes[owner.index()].last_prop {
        Some(prev) => properties[prev.index()].next = Some(prop),
        None => nodes[owner.index()].first_prop = Some(prop),
    }
    nodes[owner.index()].last_prop = Some(prop);
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utilities::fdt::{leak, reg_value, FdtBuilder};
    use test_utilities::memory::leaked_arena;

    fn parse(builder: &mut FdtBuilder) -> Result<DeviceTree, FdtError> {
        let mut arena = leaked_arena(64 * 1024);
        DeviceTree::parse(leak(builder.finish()), &mut arena)
    }

    #[test]
    fn test_minimal_blob_parses_to_a_bare_root() {
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.end_node();

        let tree = parse(&mut builder).unwrap();
        let root = tree.node(tree.root());
        assert_eq!(root.name, "");
        assert!(root.parent().is_none());
        assert_eq!(tree.children(tree.root()).count(), 0);
        assert_eq!(tree.properties(tree.root()).count(), 0);
    }

    #[test]
    fn test_bad_magic_performs_zero_arena_allocations() {
        let mut arena = leaked_arena(4 * 1024);

        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.end_node();
        let blob = leak(builder.finish_with_magic(0x1234_5678));

        assert_eq!(
            DeviceTree::parse(blob, &mut arena).err(),
            Some(FdtError::BadMagic(0x1234_5678))
        );
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_rejected_stream_performs_zero_arena_allocations() {
        let mut arena = leaked_arena(4 * 1024);

        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.raw_token(0x0000_0042);
        builder.end_node();
        let blob = leak(builder.finish());

        assert_eq!(
            DeviceTree::parse(blob, &mut arena).err(),
            Some(FdtError::UnrecognizedToken(0x42))
        );
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_children_and_properties_keep_wire_order() {
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.property("compatible", b"riscv-virtio\0");
        builder.property("#address-cells", &2u32.to_be_bytes());
        builder.begin_node("cpus");
        builder.end_node();
        builder.begin_node("soc");
        builder.begin_node("uart@10000000");
        builder.end_node();
        builder.end_node();
        builder.begin_node("memory@80000000");
        builder.end_node();
        builder.end_node();

        let tree = parse(&mut builder).unwrap();
        let root = tree.root();

        let names: std::vec::Vec<&str> =
            tree.children(root).map(|id| tree.node(id).name).collect();
        assert_eq!(names, ["cpus", "soc", "memory@80000000"]);

        let props: std::vec::Vec<&str> =
            tree.properties(root).map(|p| p.name).collect();
        assert_eq!(props, ["compatible", "#address-cells"]);

        // Grandchildren belong to their own parent, not to the root.
        let soc = tree.find_child(root, "soc").unwrap();
        assert!(tree.find_child(root, "uart@10000000").is_none());
        assert!(tree.find_child(soc, "uart@10000000").is_some());
        assert_eq!(tree.node(soc).parent(), Some(root));
    }

    #[test]
    fn test_property_values_reference_the_blob() {
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.begin_node("chosen");
        builder.property("bootargs", b"console=ttyS0\0");
        builder.end_node();
        builder.end_node();

        let tree = parse(&mut builder).unwrap();
        let chosen = tree.find_child(tree.root(), "chosen").unwrap();
        let bootargs = tree.find_property(chosen, "bootargs").unwrap();
        assert_eq!(bootargs.value, b"console=ttyS0\0");
        assert!(tree.find_property(chosen, "stdout-path").is_none());
    }

    #[test]
    fn test_nop_tokens_are_skipped() {
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.nop();
        builder.begin_node("cpus");
        builder.nop();
        builder.end_node();
        builder.end_node();

        let tree = parse(&mut builder).unwrap();
        assert_eq!(tree.children(tree.root()).count(), 1);
    }

    #[test]
    fn test_memory_size_reads_the_low_size_word() {
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.begin_node("memory@80000000");
        builder.property("device_type", b"memory\0");
        builder.property("reg", &reg_value(0x8000_0000, 0x1000_0000));
        builder.end_node();
        builder.end_node();

        let tree = parse(&mut builder).unwrap();
        assert_eq!(tree.memory_size(), 0x1000_0000);
    }

    #[test]
    fn test_memory_size_is_zero_without_node_or_property() {
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.end_node();
        let tree = parse(&mut builder).unwrap();
        assert_eq!(tree.memory_size(), 0);

        // Node present, reg missing.
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.begin_node("memory@80000000");
        builder.property("device_type", b"memory\0");
        builder.end_node();
        builder.end_node();
        let tree = parse(&mut builder).unwrap();
        assert_eq!(tree.memory_size(), 0);

        // reg present but too short to carry a size word.
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.begin_node("memory@80000000");
        builder.property("reg", &[0u8; 8]);
        builder.end_node();
        builder.end_node();
        let tree = parse(&mut builder).unwrap();
        assert_eq!(tree.memory_size(), 0);
    }

    #[test]
    fn test_unbalanced_trees_are_rejected() {
        // END_NODE with nothing open.
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        builder.end_node();
        builder.end_node();
        assert_eq!(parse(&mut builder).err(), Some(FdtError::UnbalancedTree));

        // A named node at the top level is not a root.
        let mut builder = FdtBuilder::new();
        builder.begin_node("soc");
        builder.end_node();
        assert_eq!(parse(&mut builder).err(), Some(FdtError::UnbalancedTree));

        // A property outside any node.
        let mut builder = FdtBuilder::new();
        builder.property("compatible", b"x\0");
        assert_eq!(parse(&mut builder).err(), Some(FdtError::UnbalancedTree));

        // A node left open at END.
        let mut builder = FdtBuilder::new();
        builder.begin_node("");
        assert_eq!(parse(&mut builder).err(), Some(FdtError::UnbalancedTree));
    }
}
