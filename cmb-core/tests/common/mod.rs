//! In-memory CMB images for pipeline tests.

#![allow(dead_code)]

const HEADER_SIZE: usize = 0x2C;
const SCENE_HEADER_SIZE: usize = 0x14;

struct SceneDef {
    /// `None` writes a zero name offset.
    name: Option<String>,
    kind: u8,
    args: u8,
    locals: u16,
    params: Vec<u16>,
    script: Vec<u8>,
}

#[derive(Default)]
pub struct CmbBuilder {
    globals: u16,
    pool: Vec<u8>,
    scenes: Vec<SceneDef>,
}

impl CmbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn globals(mut self, count: u16) -> Self {
        self.globals = count;
        self
    }

    /// Append a NUL-terminated string to the pool and return its offset.
    pub fn add_string(&mut self, s: &str) -> u32 {
        let offset = self.pool.len() as u32;
        self.pool.extend_from_slice(s.as_bytes());
        self.pool.push(0);
        offset
    }

    pub fn scene(mut self, name: &str, args: u8, locals: u16, script: &[u8]) -> Self {
        self.scenes.push(SceneDef {
            name: Some(name.to_string()),
            kind: 0,
            args,
            locals,
            params: Vec::new(),
            script: script.to_vec(),
        });
        self
    }

    pub fn unnamed_scene(mut self, args: u8, locals: u16, script: &[u8]) -> Self {
        self.scenes.push(SceneDef {
            name: None,
            kind: 0,
            args,
            locals,
            params: Vec::new(),
            script: script.to_vec(),
        });
        self
    }

    pub fn with_params(mut self, params: &[u16]) -> Self {
        if let Some(last) = self.scenes.last_mut() {
            last.params = params.to_vec();
        }
        self
    }

    /// Header, scene headers, names, scripts, string pool, scene table.
    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0x22..0x24].copy_from_slice(&self.globals.to_le_bytes());

        let mut headers = Vec::new();
        for scene in &self.scenes {
            headers.push(buf.len());
            buf.resize(buf.len() + SCENE_HEADER_SIZE, 0);
            for p in &scene.params {
                buf.extend_from_slice(&p.to_le_bytes());
            }
        }

        for (index, (scene, &header)) in self.scenes.iter().zip(&headers).enumerate() {
            let name_offset = match &scene.name {
                Some(name) => {
                    let offset = buf.len() as u32;
                    buf.extend_from_slice(name.as_bytes());
                    buf.push(0);
                    offset
                }
                None => 0,
            };
            let script_offset = buf.len() as u32;
            buf.extend_from_slice(&scene.script);

            buf[header..header + 4].copy_from_slice(&name_offset.to_le_bytes());
            buf[header + 4..header + 8].copy_from_slice(&script_offset.to_le_bytes());
            buf[header + 0x0C] = scene.kind;
            buf[header + 0x0D] = scene.args;
            buf[header + 0x0E] = scene.params.len() as u8;
            buf[header + 0x10..header + 0x12].copy_from_slice(&(index as u16).to_le_bytes());
            buf[header + 0x12..header + 0x14].copy_from_slice(&scene.locals.to_le_bytes());
        }

        let pool_offset = buf.len() as u32;
        buf.extend_from_slice(&self.pool);
        // keep the pool non-empty so its offset stays inside the file
        buf.push(0);

        let table_offset = buf.len() as u32;
        for &header in &headers {
            buf.extend_from_slice(&(header as u32).to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes());

        buf[0x24..0x28].copy_from_slice(&pool_offset.to_le_bytes());
        buf[0x28..0x2C].copy_from_slice(&table_offset.to_le_bytes());
        buf
    }
}
