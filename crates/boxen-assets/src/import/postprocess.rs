//! Scene Post-Processing
//!
//! Geometry clean-up steps selected by `ImportFlags`, run on the neutral
//! scene after a format importer has produced it. Steps run in a fixed
//! order: validation, triangulation, primitive sorting, UV flip, transform
//! baking, normal generation, tangent space, welding, vertex reordering,
//! and mesh merging.
//!
//! Without validation, meshes whose attribute arrays disagree in length or
//! whose faces index past the vertex list are left untouched by the
//! geometry steps.

use ahash::AHashMap;
use boxen_core::normal_matrix;
use glam::{Mat4, Vec2, Vec3};
use indexmap::IndexMap;
use smallvec::smallvec;

use super::{Face, ImportFlags, ImportedMesh, ImportedNode, ImportedScene};
use crate::ImportError;

/// Run every step enabled in `flags`
pub fn apply(scene: &mut ImportedScene, flags: ImportFlags) -> Result<(), ImportError> {
    if flags.contains(ImportFlags::VALIDATE_DATA_STRUCTURE) {
        validate(scene)?;
    }
    if flags.contains(ImportFlags::TRIANGULATE) {
        for_each_consistent(scene, triangulate);
    }
    if flags.contains(ImportFlags::SORT_BY_PTYPE) {
        drop_non_triangles(scene);
    }
    if flags.contains(ImportFlags::FLIP_UVS) {
        for_each_consistent(scene, flip_uvs);
    }
    if flags.contains(ImportFlags::PRE_TRANSFORM_VERTICES) {
        pre_transform_vertices(scene);
    }
    if flags.contains(ImportFlags::GEN_NORMALS) {
        for_each_consistent(scene, generate_normals);
    }
    if flags.contains(ImportFlags::CALC_TANGENT_SPACE) {
        for_each_consistent(scene, calculate_tangent_space);
    }
    if flags.contains(ImportFlags::JOIN_IDENTICAL_VERTICES) {
        for_each_consistent(scene, join_identical_vertices);
    }
    if flags.contains(ImportFlags::IMPROVE_CACHE_LOCALITY) {
        for_each_consistent(scene, improve_cache_locality);
    }
    if flags.contains(ImportFlags::OPTIMIZE_MESHES) {
        merge_meshes(scene);
    }
    Ok(())
}

/// Reject scenes with dangling references or malformed meshes
pub fn validate(scene: &ImportedScene) -> Result<(), ImportError> {
    let fail = |message: String| Err(ImportError::Validation(message));

    if let Some(root) = scene.root.filter(|&root| root >= scene.nodes.len()) {
        return fail(format!("root node {root} does not exist"));
    }

    for (i, node) in scene.nodes.iter().enumerate() {
        if let Some(&mesh) = node.mesh_indices.iter().find(|&&m| m >= scene.meshes.len()) {
            return fail(format!("node {i} references missing mesh {mesh}"));
        }
        if let Some(&child) = node.children.iter().find(|&&c| c >= scene.nodes.len()) {
            return fail(format!("node {i} references missing child {child}"));
        }
    }

    for (i, mesh) in scene.meshes.iter().enumerate() {
        if mesh.positions.is_empty() {
            return fail(format!("mesh {i} ('{}') has no vertices", mesh.name));
        }
        if !attributes_match(mesh) {
            return fail(format!(
                "mesh {i} ('{}') has attribute arrays of differing lengths",
                mesh.name
            ));
        }
        let vertex_count = mesh.positions.len();
        if let Some(&index) = mesh
            .faces
            .iter()
            .flatten()
            .find(|&&index| index as usize >= vertex_count)
        {
            return fail(format!(
                "mesh {i} ('{}') face index {index} exceeds {vertex_count} vertices",
                mesh.name
            ));
        }
        if let Some(material) = mesh.material.filter(|&m| m >= scene.materials.len()) {
            return fail(format!(
                "mesh {i} ('{}') references missing material {material}",
                mesh.name
            ));
        }
    }
    Ok(())
}

fn attributes_match(mesh: &ImportedMesh) -> bool {
    let n = mesh.positions.len();
    mesh.normals.as_ref().is_none_or(|v| v.len() == n)
        && mesh.tex_coords.as_ref().is_none_or(|v| v.len() == n)
        && mesh.tangents.as_ref().is_none_or(|v| v.len() == n)
        && mesh.bitangents.as_ref().is_none_or(|v| v.len() == n)
}

fn is_consistent(mesh: &ImportedMesh) -> bool {
    let n = mesh.positions.len();
    attributes_match(mesh) && mesh.faces.iter().flatten().all(|&i| (i as usize) < n)
}

fn for_each_consistent(scene: &mut ImportedScene, step: fn(&mut ImportedMesh)) {
    for mesh in scene.meshes.iter_mut().filter(|mesh| is_consistent(mesh)) {
        step(mesh);
    }
}

/// Split polygons into triangle fans around their first corner
pub fn triangulate(mesh: &mut ImportedMesh) {
    if mesh.faces.iter().all(|face| face.len() <= 3) {
        return;
    }
    let mut faces = Vec::with_capacity(mesh.faces.len());
    for face in mesh.faces.drain(..) {
        if face.len() <= 3 {
            faces.push(face);
            continue;
        }
        for i in 1..face.len() - 1 {
            faces.push(smallvec![face[0], face[i], face[i + 1]]);
        }
    }
    mesh.faces = faces;
}

/// Remove point and line faces, then meshes left without faces
fn drop_non_triangles(scene: &mut ImportedScene) {
    for mesh in &mut scene.meshes {
        mesh.faces.retain(|face| face.len() >= 3);
    }
    let keep: Vec<bool> = scene.meshes.iter().map(|mesh| !mesh.faces.is_empty()).collect();
    if keep.iter().all(|&k| k) {
        return;
    }

    let dropped = keep.iter().filter(|&&k| !k).count();
    log::debug!("Dropping {dropped} meshes without triangles");
    let mut keep_iter = keep.iter();
    scene.meshes.retain(|_| keep_iter.next().copied().unwrap_or(true));
    remap_mesh_indices(&mut scene.nodes, &keep);
}

/// Rewrite node mesh lists after meshes were removed. `keep[i]` tells
/// whether old mesh `i` survived.
fn remap_mesh_indices(nodes: &mut [ImportedNode], keep: &[bool]) {
    let mut remap = Vec::with_capacity(keep.len());
    let mut next = 0;
    for &kept in keep {
        remap.push(kept.then_some(next));
        next += usize::from(kept);
    }
    for node in nodes {
        node.mesh_indices = node
            .mesh_indices
            .iter()
            .filter_map(|&m| remap.get(m).copied().flatten())
            .collect();
    }
}

/// Mirror texture coordinates vertically
pub fn flip_uvs(mesh: &mut ImportedMesh) {
    if let Some(tex_coords) = &mut mesh.tex_coords {
        for uv in tex_coords {
            uv.y = 1.0 - uv.y;
        }
    }
}

/// Bake world transforms into vertex data and flatten the hierarchy into a
/// single root holding every placed mesh
fn pre_transform_vertices(scene: &mut ImportedScene) {
    let Some(root) = scene.root else {
        return;
    };

    let mut placed = Vec::new();
    let mut visited = vec![false; scene.nodes.len()];
    let mut stack = vec![(root, Mat4::IDENTITY)];
    while let Some((index, parent)) = stack.pop() {
        let Some(node) = scene.nodes.get(index) else {
            continue;
        };
        if std::mem::replace(&mut visited[index], true) {
            continue;
        }
        let world = parent * node.transform;
        for &m in &node.mesh_indices {
            if let Some(mesh) = scene.meshes.get(m) {
                let mut mesh = mesh.clone();
                if is_consistent(&mesh) {
                    bake_transform(&mut mesh, world);
                }
                placed.push(mesh);
            }
        }
        for &child in node.children.iter().rev() {
            stack.push((child, world));
        }
    }

    scene.nodes = vec![ImportedNode {
        name: "root".to_string(),
        mesh_indices: (0..placed.len()).collect(),
        ..Default::default()
    }];
    scene.meshes = placed;
    scene.root = Some(0);
}

fn bake_transform(mesh: &mut ImportedMesh, matrix: Mat4) {
    if matrix == Mat4::IDENTITY {
        return;
    }
    let directions = normal_matrix(matrix);
    for position in &mut mesh.positions {
        *position = matrix.transform_point3(*position);
    }
    for vectors in [&mut mesh.normals, &mut mesh.tangents, &mut mesh.bitangents]
        .into_iter()
        .flatten()
    {
        for v in vectors {
            *v = (directions * *v).normalize_or_zero();
        }
    }
    // Mirroring transforms flip the winding
    if matrix.determinant() < 0.0 {
        for face in &mut mesh.faces {
            face.reverse();
        }
    }
}

/// Generate smooth, area-weighted normals for meshes that have none
pub fn generate_normals(mesh: &mut ImportedMesh) {
    if mesh.normals.is_some() {
        return;
    }
    let mut normals = vec![Vec3::ZERO; mesh.positions.len()];
    for face in mesh.faces.iter().filter(|face| face.len() >= 3) {
        let p0 = mesh.positions[face[0] as usize];
        for i in 1..face.len() - 1 {
            let (a, b) = (face[i] as usize, face[i + 1] as usize);
            let weighted = (mesh.positions[a] - p0).cross(mesh.positions[b] - p0);
            for vertex in [face[0] as usize, a, b] {
                normals[vertex] += weighted;
            }
        }
    }
    for normal in &mut normals {
        *normal = normal.try_normalize().unwrap_or(Vec3::Y);
    }
    mesh.normals = Some(normals);
}

/// Generate per-vertex tangents and bitangents from texture coordinates.
///
/// Needs normals and UVs. Tangents are orthogonalized against the normal
/// and the bitangent keeps the handedness of the UV mapping.
pub fn calculate_tangent_space(mesh: &mut ImportedMesh) {
    if mesh.tangents.is_some() && mesh.bitangents.is_some() {
        return;
    }
    let (Some(normals), Some(tex_coords)) = (&mesh.normals, &mesh.tex_coords) else {
        return;
    };

    let count = mesh.positions.len();
    let mut tangents = vec![Vec3::ZERO; count];
    let mut bitangents = vec![Vec3::ZERO; count];
    for face in mesh.faces.iter().filter(|face| face.len() >= 3) {
        for i in 1..face.len() - 1 {
            let corners = [face[0] as usize, face[i] as usize, face[i + 1] as usize];
            let [a, b, c] = corners;
            let edge1 = mesh.positions[b] - mesh.positions[a];
            let edge2 = mesh.positions[c] - mesh.positions[a];
            let duv1: Vec2 = tex_coords[b] - tex_coords[a];
            let duv2: Vec2 = tex_coords[c] - tex_coords[a];

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() <= f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
            let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;
            for vertex in corners {
                tangents[vertex] += tangent;
                bitangents[vertex] += bitangent;
            }
        }
    }

    for ((tangent, bitangent), normal) in tangents.iter_mut().zip(&mut bitangents).zip(normals) {
        let normal = normal.try_normalize().unwrap_or(Vec3::Y);
        let orthogonal = (*tangent - normal * normal.dot(*tangent))
            .try_normalize()
            .unwrap_or_else(|| normal.any_orthonormal_vector());
        let handedness = if normal.cross(orthogonal).dot(*bitangent) < 0.0 {
            -1.0
        } else {
            1.0
        };
        *tangent = orthogonal;
        *bitangent = normal.cross(orthogonal) * handedness;
    }

    mesh.tangents = Some(tangents);
    mesh.bitangents = Some(bitangents);
}

/// Bit pattern of every attribute of one vertex
fn vertex_key(mesh: &ImportedMesh, i: usize) -> [u32; 14] {
    let mut key = [0u32; 14];
    let mut write = |offset: usize, values: &[f32]| {
        for (slot, value) in key[offset..].iter_mut().zip(values) {
            *slot = value.to_bits();
        }
    };
    write(0, &mesh.positions[i].to_array());
    if let Some(normals) = &mesh.normals {
        write(3, &normals[i].to_array());
    }
    if let Some(tex_coords) = &mesh.tex_coords {
        write(6, &tex_coords[i].to_array());
    }
    if let Some(tangents) = &mesh.tangents {
        write(8, &tangents[i].to_array());
    }
    if let Some(bitangents) = &mesh.bitangents {
        write(11, &bitangents[i].to_array());
    }
    key
}

/// Weld vertices whose attributes are bit-identical
pub fn join_identical_vertices(mesh: &mut ImportedMesh) {
    let count = mesh.positions.len();
    let mut unique: AHashMap<[u32; 14], u32> = AHashMap::with_capacity(count);
    let mut first_of = Vec::with_capacity(count);
    let mut remap = Vec::with_capacity(count);
    for i in 0..count {
        let next = first_of.len() as u32;
        let target = *unique.entry(vertex_key(mesh, i)).or_insert(next);
        if target == next {
            first_of.push(i);
        }
        remap.push(target);
    }
    if first_of.len() == count {
        return;
    }

    log::trace!("Welded '{}': {} -> {} vertices", mesh.name, count, first_of.len());
    reorder_vertices(mesh, &first_of, &remap);
}

/// Renumber vertices in order of first use by the faces
pub fn improve_cache_locality(mesh: &mut ImportedMesh) {
    let count = mesh.positions.len();
    let mut remap = vec![u32::MAX; count];
    let mut order = Vec::with_capacity(count);
    for &index in mesh.faces.iter().flatten() {
        let slot = &mut remap[index as usize];
        if *slot == u32::MAX {
            *slot = order.len() as u32;
            order.push(index as usize);
        }
    }
    // Unreferenced vertices keep their relative order at the end
    for (i, slot) in remap.iter_mut().enumerate() {
        if *slot == u32::MAX {
            *slot = order.len() as u32;
            order.push(i);
        }
    }
    if order.iter().enumerate().all(|(new, &old)| new == old) {
        return;
    }
    reorder_vertices(mesh, &order, &remap);
}

/// Rebuild attributes as `order` (new -> old) and faces through `remap`
/// (old -> new)
fn reorder_vertices(mesh: &mut ImportedMesh, order: &[usize], remap: &[u32]) {
    fn gather<T: Copy>(values: &[T], order: &[usize]) -> Vec<T> {
        order.iter().map(|&i| values[i]).collect()
    }

    mesh.positions = gather(&mesh.positions, order);
    mesh.normals = mesh.normals.as_deref().map(|v| gather(v, order));
    mesh.tex_coords = mesh.tex_coords.as_deref().map(|v| gather(v, order));
    mesh.tangents = mesh.tangents.as_deref().map(|v| gather(v, order));
    mesh.bitangents = mesh.bitangents.as_deref().map(|v| gather(v, order));
    for index in mesh.faces.iter_mut().flat_map(|face| face.iter_mut()) {
        *index = remap[*index as usize];
    }
}

/// Which optional attributes a mesh carries
fn attribute_signature(mesh: &ImportedMesh) -> [bool; 4] {
    [
        mesh.normals.is_some(),
        mesh.tex_coords.is_some(),
        mesh.tangents.is_some(),
        mesh.bitangents.is_some(),
    ]
}

/// Merge meshes attached to the same node that share a material and an
/// attribute signature. Meshes referenced from several nodes are kept as is.
fn merge_meshes(scene: &mut ImportedScene) {
    let mut references = vec![0usize; scene.meshes.len()];
    for &m in scene.nodes.iter().flat_map(|node| &node.mesh_indices) {
        if let Some(count) = references.get_mut(m) {
            *count += 1;
        }
    }

    let mut meshes = std::mem::take(&mut scene.meshes);
    let mut merged: Vec<ImportedMesh> = Vec::with_capacity(meshes.len());
    let mut shared: Vec<Option<usize>> = vec![None; meshes.len()];
    for node in &mut scene.nodes {
        let mut groups: IndexMap<(Option<usize>, [bool; 4]), usize> = IndexMap::new();
        let mut mesh_indices = Vec::with_capacity(node.mesh_indices.len());
        for &m in &node.mesh_indices {
            let Some(mesh) = meshes.get_mut(m) else {
                continue;
            };
            if references[m] > 1 || !is_consistent(mesh) {
                let target = *shared[m].get_or_insert_with(|| {
                    merged.push(mesh.clone());
                    merged.len() - 1
                });
                mesh_indices.push(target);
                continue;
            }

            let key = (mesh.material, attribute_signature(mesh));
            let mesh = std::mem::take(mesh);
            match groups.get(&key) {
                Some(&target) => append_mesh(&mut merged[target], mesh),
                None => {
                    merged.push(mesh);
                    groups.insert(key, merged.len() - 1);
                    mesh_indices.push(merged.len() - 1);
                }
            }
        }
        node.mesh_indices = mesh_indices;
    }

    if merged.len() < meshes.len() {
        log::debug!("Merged {} meshes into {}", meshes.len(), merged.len());
    }
    scene.meshes = merged;
}

fn append_mesh(target: &mut ImportedMesh, source: ImportedMesh) {
    let offset = target.positions.len() as u32;
    target.positions.extend(source.positions);
    if let (Some(a), Some(b)) = (&mut target.normals, source.normals) {
        a.extend(b);
    }
    if let (Some(a), Some(b)) = (&mut target.tex_coords, source.tex_coords) {
        a.extend(b);
    }
    if let (Some(a), Some(b)) = (&mut target.tangents, source.tangents) {
        a.extend(b);
    }
    if let (Some(a), Some(b)) = (&mut target.bitangents, source.bitangents) {
        a.extend(b);
    }
    target.faces.extend(
        source
            .faces
            .into_iter()
            .map(|face| face.iter().map(|&i| i + offset).collect::<Face>()),
    );
}
