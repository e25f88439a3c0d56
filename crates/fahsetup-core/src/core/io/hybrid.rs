//! Array layouts for the hybrid system artifacts.
//!
//! - `htf.npz` bundles the numeric description of the hybrid system
//! - `hybrid_topology.npy` is a per-atom structured table
//! - `references.npy` is a single provenance record

use super::npy::{Array, Field, FieldKind, NpyError, NpzWriter, RecordArray, Value};
use crate::core::models::references::References;
use crate::core::models::system::HybridSystem;
use crate::core::models::topology::HybridTopology;
use std::io::{Seek, Write};
use std::path::Path;

fn flatten_pairs(pairs: &[(usize, usize)]) -> Vec<i64> {
    pairs
        .iter()
        .flat_map(|&(a, b)| [a as i64, b as i64])
        .collect()
}

/// Writes the numeric arrays of a hybrid system into an open `.npz` archive.
///
/// Members: `hybrid_positions` (n, 3), `hybrid_box_vectors` (3, 3) when periodic,
/// `old_to_hybrid_atom_map` and `new_to_hybrid_atom_map` (k, 2), `atom_classes` (n,)
/// and `bonds` (m, 2).
pub fn write_hybrid_arrays<W: Write + Seek>(
    npz: &mut NpzWriter<W>,
    system: &HybridSystem,
) -> Result<(), NpyError> {
    let positions: Vec<f64> = system
        .positions
        .iter()
        .flat_map(|p| [p.x, p.y, p.z])
        .collect();
    npz.add(
        "hybrid_positions",
        &Array::new(&[system.positions.len(), 3], &positions)?,
    )?;

    if let Some(box_vectors) = &system.box_vectors {
        let flat: Vec<f64> = box_vectors.iter().flat_map(|v| [v.x, v.y, v.z]).collect();
        npz.add("hybrid_box_vectors", &Array::new(&[3, 3], &flat)?)?;
    }

    for (name, pairs) in [
        ("old_to_hybrid_atom_map", &system.old_to_hybrid),
        ("new_to_hybrid_atom_map", &system.new_to_hybrid),
    ] {
        let flat = flatten_pairs(pairs);
        npz.add(name, &Array::new(&[pairs.len(), 2], &flat)?)?;
    }

    let classes: Vec<i8> = system.atom_classes.iter().map(|c| c.code()).collect();
    npz.add("atom_classes", &Array::vector(&classes))?;

    let bonds: Vec<(usize, usize)> = system
        .topology
        .bonds()
        .iter()
        .map(|b| (b.atom1, b.atom2))
        .collect();
    let flat = flatten_pairs(&bonds);
    npz.add("bonds", &Array::new(&[bonds.len(), 2], &flat)?)?;
    Ok(())
}

/// Creates `path` and writes the hybrid system archive into it.
pub fn write_hybrid_npz<P: AsRef<Path>>(path: P, system: &HybridSystem) -> Result<(), NpyError> {
    let mut npz = NpzWriter::create(path)?;
    write_hybrid_arrays(&mut npz, system)?;
    npz.finish()?;
    Ok(())
}

/// Builds the per-atom topology table: `serial`, `name`, `element`, `resSeq`,
/// `resName`, `chainID`, `segmentID`.
pub fn topology_table(topology: &HybridTopology) -> Result<RecordArray, NpyError> {
    let atoms = topology.atoms();
    let fields = vec![
        Field::new("serial", FieldKind::Int64),
        Field::text_for("name", atoms.iter().map(|a| a.name.as_str())),
        Field::text_for("element", atoms.iter().map(|a| a.element.as_str())),
        Field::new("resSeq", FieldKind::Int64),
        Field::text_for("resName", atoms.iter().map(|a| a.residue_name.as_str())),
        Field::new("chainID", FieldKind::Unicode(1)),
        Field::text_for("segmentID", atoms.iter().map(|a| a.segment_id.as_str())),
    ];

    let mut table = RecordArray::new(fields);
    for (index, atom) in atoms.iter().enumerate() {
        table.push(vec![
            Value::Int(index as i64 + 1),
            Value::Text(atom.name.clone()),
            Value::Text(atom.element.clone()),
            Value::Int(atom.residue_seq as i64),
            Value::Text(atom.residue_name.clone()),
            Value::Text(atom.chain_id.to_string()),
            Value::Text(atom.segment_id.clone()),
        ])?;
    }
    Ok(table)
}

/// Builds the zero-dimensional provenance record. A missing protein structure is
/// stored as an empty string.
pub fn references_record(references: &References) -> Result<RecordArray, NpyError> {
    let protein = references.protein_pdb.clone().unwrap_or_default();
    RecordArray::scalar(
        vec![
            Field::new("start_ligand", FieldKind::Int64),
            Field::new("end_ligand", FieldKind::Int64),
            Field::text_for("protein_pdb", [protein.as_str()]),
            Field::new("passed_structure_relax", FieldKind::Bool),
        ],
        vec![
            Value::Int(references.start_ligand as i64),
            Value::Int(references.end_ligand as i64),
            Value::Text(protein.clone()),
            Value::Bool(references.passed_structure_relax),
        ],
    )
}
