use std::path::{Path, PathBuf};
use color_eyre::Result;
use color_eyre::eyre::{eyre, WrapErr};
use glam::Vec3;
use crate::renderer::resources::material::{Material, MaterialId, MaterialTable};
use crate::renderer::shader_data::{MaterialProperties, PerVertexData};

/// Faces `[start_face, next run's start_face)` are drawn with `material`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRun {
    pub start_face: u32,
    pub material: MaterialId,
}

/// De-indexed triangle list plus the material runs covering it
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<PerVertexData>,
    pub runs: Vec<MaterialRun>,
    pub face_count: u32,
}

impl Mesh {
    /// Loads an OBJ file and its material library, registering materials in `materials`
    pub fn load_obj(path: &Path, materials: &mut MaterialTable) -> Result<Self> {
        let (models, obj_materials) = tobj::load_obj(path, &load_options())
            .wrap_err_with(|| format!("Failed to load OBJ file {:?}", path))?;

        let obj_materials = obj_materials.unwrap_or_else(|e| {
            log::warn!("Material library for {:?} not loaded: {}", path, e);
            Vec::new()
        });

        Self::from_tobj(&models, &obj_materials, materials)
    }

    pub fn from_tobj(
        models: &[tobj::Model],
        obj_materials: &[tobj::Material],
        materials: &mut MaterialTable,
    ) -> Result<Self> {
        let material_ids = obj_materials
            .iter()
            .map(|m| materials.insert(convert_material(m)))
            .collect::<Vec<_>>();

        let mut vertices = Vec::new();
        let mut spans = Vec::with_capacity(models.len());

        for model in models {
            let faces = append_vertices(&model.mesh, &mut vertices)
                .wrap_err_with(|| format!("Malformed mesh {:?}", model.name))?;
            let material = match model.mesh.material_id.and_then(|i| material_ids.get(i)) {
                Some(id) => *id,
                None => materials.default_material(),
            };
            spans.push((faces, material));
        }

        let face_count: u32 = spans.iter().map(|(faces, _)| faces).sum();
        let runs = runs_from_spans(&spans);
        log::info!(
            "Loaded {} faces in {} material runs ({} materials)",
            face_count,
            runs.len(),
            materials.len(),
        );

        Ok(Self {
            vertices,
            runs,
            face_count,
        })
    }
}

pub fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ..Default::default()
    }
}

/// Turns consecutive `(face_count, material)` spans into runs, merging neighbours that share a
/// material and skipping empty spans
pub fn runs_from_spans(spans: &[(u32, MaterialId)]) -> Vec<MaterialRun> {
    let mut runs: Vec<MaterialRun> = Vec::new();
    let mut start_face = 0;

    for &(faces, material) in spans {
        if faces == 0 {
            continue;
        }
        if runs.last().is_none_or(|run| run.material != material) {
            runs.push(MaterialRun { start_face, material });
        }
        start_face += faces;
    }

    runs
}

fn append_vertices(mesh: &tobj::Mesh, out: &mut Vec<PerVertexData>) -> Result<u32> {
    if mesh.indices.len() % 3 != 0 {
        return Err(eyre!("index count {} is not a multiple of 3", mesh.indices.len()));
    }

    let position = |i: u32| -> Result<Vec3> {
        let i = i as usize * 3;
        mesh.positions
            .get(i..i + 3)
            .map(Vec3::from_slice)
            .ok_or_else(|| eyre!("position index {} out of range", i / 3))
    };

    for (face, corners) in mesh.indices.chunks_exact(3).enumerate() {
        let positions = [
            position(corners[0])?,
            position(corners[1])?,
            position(corners[2])?,
        ];
        let flat_normal = (positions[1] - positions[0])
            .cross(positions[2] - positions[0])
            .normalize_or_zero();

        for (corner, p) in positions.iter().enumerate() {
            let k = face * 3 + corner;

            let normal = mesh.normal_indices
                .get(k)
                .and_then(|&n| mesh.normals.get(n as usize * 3..n as usize * 3 + 3))
                .map(Vec3::from_slice)
                .unwrap_or(flat_normal);

            // OBJ texture space starts at the bottom left
            let texcoord = mesh.texcoord_indices
                .get(k)
                .and_then(|&t| mesh.texcoords.get(t as usize * 2..t as usize * 2 + 2))
                .map(|uv| [uv[0], 1.0 - uv[1]])
                .unwrap_or([0.0, 0.0]);

            out.push(PerVertexData {
                position: p.extend(1.0).to_array(),
                normal: normal.extend(0.0).to_array(),
                texcoord,
            });
        }
    }

    Ok((mesh.indices.len() / 3) as u32)
}

fn convert_material(m: &tobj::Material) -> Material {
    let defaults = MaterialProperties::default();
    let properties = MaterialProperties {
        ambient: m.ambient.unwrap_or(defaults.ambient),
        diffuse: m.diffuse.unwrap_or(defaults.diffuse),
        specular: m.specular.unwrap_or(defaults.specular),
        specular_exponent: m.shininess.unwrap_or(defaults.specular_exponent),
        optical_density: m.optical_density.unwrap_or(defaults.optical_density),
        dissolve: m.dissolve.unwrap_or(defaults.dissolve),
        illumination: m.illumination_model.map_or(defaults.illumination, f32::from),
        ..defaults
    };

    Material {
        name: m.name.clone(),
        diffuse_texture: m.diffuse_texture
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(PathBuf::from),
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MTL: &str = "\
newmtl red
Kd 1.0 0.0 0.0
Ns 50.0
illum 2
map_Kd red.bmp

newmtl blue
Kd 0.0 0.0 1.0
";

    const OBJ: &str = "\
mtllib scene.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vn 0 0 1
o first
usemtl red
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/3/1
o second
usemtl blue
f 1 2 4
";

    fn load(obj: &str) -> (Mesh, MaterialTable) {
        let (models, obj_materials) = tobj::load_obj_buf(
            &mut Cursor::new(obj),
            &load_options(),
            |_| tobj::load_mtl_buf(&mut Cursor::new(MTL)),
        )
        .unwrap();
        let mut table = MaterialTable::new();
        let mesh = Mesh::from_tobj(&models, &obj_materials.unwrap(), &mut table).unwrap();
        (mesh, table)
    }

    /// Runs are sorted, disjoint and cover `[0, face_count)`
    fn runs_partition_faces(mesh: &Mesh) -> bool {
        match mesh.runs.first() {
            None => mesh.face_count == 0,
            Some(first) => {
                first.start_face == 0
                    && mesh.runs.windows(2).all(|w| w[0].start_face < w[1].start_face)
                    && mesh.runs.last().is_some_and(|last| last.start_face < mesh.face_count)
            }
        }
    }

    #[test]
    fn obj_groups_become_runs() {
        let (mesh, table) = load(OBJ);

        assert_eq!(mesh.face_count, 3);
        assert_eq!(mesh.vertices.len(), 9);
        assert!(runs_partition_faces(&mesh));

        let names: Vec<_> = mesh.runs
            .iter()
            .map(|run| (run.start_face, table.get(run.material).unwrap().name.as_str()))
            .collect();
        assert_eq!(names, vec![(0, "red"), (2, "blue")]);
    }

    #[test]
    fn material_values_come_from_mtl() {
        let (_, table) = load(OBJ);
        let red = table.get(table.find("red").unwrap()).unwrap();
        assert_eq!(red.properties.diffuse, [1.0, 0.0, 0.0]);
        assert_eq!(red.properties.specular_exponent, 50.0);
        assert_eq!(red.properties.illumination, 2.0);
        assert_eq!(red.diffuse_texture, Some(PathBuf::from("red.bmp")));

        let blue = table.get(table.find("blue").unwrap()).unwrap();
        assert_eq!(blue.diffuse_texture, None);
        assert_eq!(blue.properties.specular_exponent, 100.0);
    }

    #[test]
    fn texcoords_are_flipped_and_normals_filled() {
        let (mesh, _) = load(OBJ);
        // Second corner of the first face uses vt 1 0
        assert_eq!(mesh.vertices[1].texcoord, [1.0, 1.0]);
        assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0, 1.0]);

        // Last face has no normals, so it gets the face normal
        assert_eq!(mesh.vertices[8].normal, [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn spans_merge_and_skip_empty() {
        let mut table = MaterialTable::new();
        let a = table.insert(Material::new("a"));
        let b = table.insert(Material::new("b"));

        let runs = runs_from_spans(&[(4, a), (0, b), (2, a), (3, b)]);
        assert_eq!(
            runs,
            vec![
                MaterialRun { start_face: 0, material: a },
                MaterialRun { start_face: 6, material: b },
            ]
        );
        let mesh = Mesh { vertices: Vec::new(), runs, face_count: 9 };
        assert!(runs_partition_faces(&mesh));
    }

    #[test]
    fn partition_check_rejects_bad_runs() {
        let mut table = MaterialTable::new();
        let a = table.insert(Material::new("a"));
        let run = |start_face| MaterialRun { start_face, material: a };

        let unsorted = Mesh { vertices: Vec::new(), runs: vec![run(0), run(5), run(3)], face_count: 8 };
        assert!(!runs_partition_faces(&unsorted));

        let late_start = Mesh { vertices: Vec::new(), runs: vec![run(1)], face_count: 8 };
        assert!(!runs_partition_faces(&late_start));

        let past_end = Mesh { vertices: Vec::new(), runs: vec![run(0), run(8)], face_count: 8 };
        assert!(!runs_partition_faces(&past_end));
    }
}
