use pretty_assertions::assert_eq;

use crate::logical::shared_logical_index_map;
use crate::{
    flatten_table, BaseKind, ConstantDesc, ConstantMap, ConstantNode, ConstantTable, ConstantType,
    ParameterScope, ReflectError, RegisterClass, ScalarKind,
};

/// In-memory constant-table node standing in for a compiler backend.
#[derive(Clone)]
struct Node {
    desc: ConstantDesc,
    children: Vec<Node>,
    broken: bool,
}

impl Node {
    fn leaf(
        name: &str,
        kind: ScalarKind,
        class: RegisterClass,
        rows: u32,
        columns: u32,
        elements: u32,
        register_index: u32,
        register_count: u32,
    ) -> Node {
        Node {
            desc: ConstantDesc {
                name: name.to_owned(),
                class,
                kind,
                rows,
                columns,
                elements,
                register_index,
                register_count,
                member_count: 0,
            },
            children: Vec::new(),
            broken: false,
        }
    }

    fn float_vec(name: &str, columns: u32, register_index: u32) -> Node {
        Node::leaf(
            name,
            ScalarKind::Float,
            RegisterClass::Vector,
            1,
            columns,
            1,
            register_index,
            1,
        )
    }

    fn strukt(name: &str, children: Vec<Node>) -> Node {
        let member_count = children.len() as u32;
        Node {
            desc: ConstantDesc {
                name: name.to_owned(),
                class: RegisterClass::Struct,
                kind: ScalarKind::Other,
                rows: 0,
                columns: 0,
                elements: 1,
                register_index: 0,
                register_count: 0,
                member_count,
            },
            children,
            broken: false,
        }
    }

    fn broken(name: &str) -> Node {
        let mut node = Node::float_vec(name, 4, 0);
        node.broken = true;
        node
    }
}

impl ConstantNode for Node {
    fn desc(&self) -> Result<ConstantDesc, ReflectError> {
        if self.broken {
            return Err(ReflectError::Description(format!(
                "no description for `{}`",
                self.desc.name
            )));
        }
        Ok(self.desc.clone())
    }

    fn child(&self, index: u32) -> Result<Node, ReflectError> {
        self.children
            .get(index as usize)
            .cloned()
            .ok_or_else(|| ReflectError::Description(format!("no struct member {index}")))
    }
}

struct Table(Vec<Node>);

impl ConstantTable for Table {
    type Node = Node;

    fn constant_count(&self) -> u32 {
        self.0.len() as u32
    }

    fn constant(&self, index: u32) -> Result<Node, ReflectError> {
        self.0
            .get(index as usize)
            .cloned()
            .ok_or_else(|| ReflectError::Description(format!("no constant {index}")))
    }
}

fn flatten(table: &Table) -> (ConstantMap, crate::LogicalIndexMap, usize) {
    let logical = shared_logical_index_map();
    let mut defs = ConstantMap::new();
    let size = flatten_table(table, &mut defs, &logical).expect("flatten should succeed");
    let map = std::mem::take(&mut *logical.lock().unwrap());
    (defs, map, size)
}

#[test]
fn single_float4_global() {
    let table = Table(vec![Node::float_vec("$lightColor", 4, 3)]);
    let (defs, logical, size) = flatten(&table);

    assert_eq!(defs.len(), 1);
    let def = defs.get("lightColor").expect("sentinel must be stripped");
    assert_eq!(def.const_type, ConstantType::Float4);
    assert_eq!(def.array_size, 1);
    assert_eq!(def.element_size, 1);
    assert_eq!(def.logical_index, 3);
    assert_eq!(def.physical_index, 0);

    let use_ = logical.get(3).expect("logical slot 3 must be registered");
    assert_eq!(use_.physical_index, 0);
    assert_eq!(use_.size, 1);
    assert_eq!(use_.scope, ParameterScope::Global);
    assert_eq!(use_.kind, BaseKind::Float);
    assert_eq!(logical.buffer_size(), 1);

    assert_eq!(
        size,
        std::mem::size_of::<usize>() + "lightColor".len() + 20
    );
}

#[test]
fn nested_structs_get_dotted_names_in_declaration_order() {
    let table = Table(vec![
        Node::strukt(
            "light",
            vec![
                Node::float_vec("position", 3, 0),
                Node::strukt("attenuation", vec![Node::float_vec("range", 1, 1)]),
                Node::float_vec("color", 4, 2),
            ],
        ),
        Node::float_vec("exposure", 1, 3),
    ]);
    let (defs, logical, _) = flatten(&table);

    let names: Vec<&str> = defs.iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        vec![
            "light.position",
            "light.attenuation.range",
            "light.color",
            "exposure"
        ]
    );

    // Physical offsets follow discovery order, 4 bytes per register unit.
    assert_eq!(defs.get("light.position").unwrap().physical_index, 0);
    assert_eq!(defs.get("light.attenuation.range").unwrap().physical_index, 4);
    assert_eq!(defs.get("light.color").unwrap().physical_index, 8);
    assert_eq!(defs.get("exposure").unwrap().physical_index, 12);
    assert_eq!(logical.buffer_size(), 4);
}

#[test]
fn array_suffix_is_stripped() {
    let mut node = Node::float_vec("weights[0]", 4, 0);
    node.desc.elements = 4;
    node.desc.register_count = 4;
    let (defs, logical, _) = flatten(&Table(vec![node]));

    let def = defs.get("weights").expect("[0] suffix must be stripped");
    assert_eq!(def.array_size, 4);
    assert_eq!(def.element_size, 1);
    assert_eq!(logical.get(0).unwrap().size, 4);
    assert_eq!(logical.buffer_size(), 4);
}

#[test]
fn matrix_row_major_3x3_array() {
    // 3x3 row-major, array of 2: 3 registers per element, 6 total.
    let table = Table(vec![Node::leaf(
        "bones[0]",
        ScalarKind::Float,
        RegisterClass::MatrixRows,
        3,
        3,
        2,
        0,
        6,
    )]);
    let (defs, logical, _) = flatten(&table);

    let def = defs.get("bones").unwrap();
    assert_eq!(def.const_type, ConstantType::Matrix3x3);
    assert_eq!(def.element_size, 12);
    assert_eq!(def.array_size, 2);
    assert_eq!(logical.get(0).unwrap().size, 24);
    assert_eq!(logical.buffer_size(), 24);
}

#[test]
fn matrix_element_size_ignores_minor_dimension() {
    // Row-major 2x4: 2 registers per element, element size stays 8.
    let two_by_four = Node::leaf(
        "m24",
        ScalarKind::Float,
        RegisterClass::MatrixRows,
        2,
        4,
        1,
        0,
        2,
    );
    // Column-major 4x2: one register per column, 2 registers per element.
    let four_by_two = Node::leaf(
        "m42",
        ScalarKind::Float,
        RegisterClass::MatrixColumns,
        4,
        2,
        1,
        2,
        2,
    );
    // Row-major 4x4.
    let four_by_four = Node::leaf(
        "m44",
        ScalarKind::Float,
        RegisterClass::MatrixRows,
        4,
        4,
        1,
        4,
        4,
    );
    let (defs, _, _) = flatten(&Table(vec![two_by_four, four_by_two, four_by_four]));

    assert_eq!(defs.get("m24").unwrap().const_type, ConstantType::Matrix2x4);
    assert_eq!(defs.get("m24").unwrap().element_size, 8);
    // Column-major storage swaps the minor dimension source: 2 registers,
    // 4 rows -> 2x4 semantic shape.
    assert_eq!(defs.get("m42").unwrap().const_type, ConstantType::Matrix2x4);
    assert_eq!(defs.get("m42").unwrap().element_size, 8);
    assert_eq!(defs.get("m44").unwrap().const_type, ConstantType::Matrix4x4);
    assert_eq!(defs.get("m44").unwrap().element_size, 16);
}

#[test]
fn unsupported_matrix_shape_is_an_error() {
    // 5 registers per element cannot come from a valid D3D9 matrix.
    let table = Table(vec![Node::leaf(
        "weird",
        ScalarKind::Float,
        RegisterClass::MatrixRows,
        5,
        4,
        1,
        0,
        5,
    )]);
    let logical = shared_logical_index_map();
    let mut defs = ConstantMap::new();
    let err = flatten_table(&table, &mut defs, &logical).unwrap_err();
    assert!(matches!(
        err,
        ReflectError::UnsupportedMatrixShape {
            first_dim: 5,
            second_dim: 4,
            ..
        }
    ));
}

#[test]
fn duplicate_names_keep_first_definition_but_account_all_registers() {
    let table = Table(vec![
        Node::float_vec("tint", 4, 0),
        Node::float_vec("tint", 4, 7),
    ]);
    let (defs, logical, _) = flatten(&table);

    assert_eq!(defs.len(), 1);
    assert_eq!(defs.get("tint").unwrap().logical_index, 0);

    // Both raw constants still occupy registers and logical slots.
    assert_eq!(logical.len(), 2);
    assert_eq!(logical.get(7).unwrap().physical_index, 4);
    assert_eq!(logical.buffer_size(), 2);
}

#[test]
fn samplers_are_skipped() {
    let table = Table(vec![
        Node::leaf(
            "diffuseMap",
            ScalarKind::Sampler,
            RegisterClass::Object,
            1,
            1,
            1,
            0,
            1,
        ),
        Node::float_vec("tint", 4, 0),
    ]);
    let (defs, logical, _) = flatten(&table);

    assert_eq!(defs.len(), 1);
    assert!(defs.get("diffuseMap").is_none());
    assert_eq!(logical.buffer_size(), 1);
}

#[test]
fn bool_constants_use_the_int_register_file() {
    let table = Table(vec![Node::leaf(
        "enabled",
        ScalarKind::Bool,
        RegisterClass::Scalar,
        1,
        1,
        1,
        4,
        1,
    )]);
    let (defs, logical, _) = flatten(&table);

    assert_eq!(defs.get("enabled").unwrap().const_type, ConstantType::Int1);
    assert_eq!(logical.get(4).unwrap().kind, BaseKind::Int);
}

#[test]
fn description_failure_aborts_the_walk() {
    let table = Table(vec![Node::float_vec("ok", 4, 0), Node::broken("bad")]);
    let logical = shared_logical_index_map();
    let mut defs = ConstantMap::new();
    let err = flatten_table(&table, &mut defs, &logical).unwrap_err();
    assert!(matches!(err, ReflectError::Description(_)));
}

#[test]
fn rebuild_reproduces_the_layout_of_a_fresh_flatten() {
    let table = Table(vec![
        Node::float_vec("a", 4, 0),
        Node::leaf(
            "world",
            ScalarKind::Float,
            RegisterClass::MatrixRows,
            4,
            4,
            1,
            1,
            4,
        ),
        Node::float_vec("b", 2, 5),
    ]);
    let (defs, fresh, _) = flatten(&table);

    let mut rebuilt = crate::LogicalIndexMap::default();
    rebuilt.rebuild_from(&defs);

    assert_eq!(rebuilt.buffer_size(), fresh.buffer_size());
    for logical_index in [0, 1, 5] {
        assert_eq!(rebuilt.get(logical_index), fresh.get(logical_index));
    }
}
