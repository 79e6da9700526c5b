//! 全流程集成测试：本地树到本地树走完索引、传输、标识回填

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{bump_dir, connect_pool, write_file, CountingRemote};
use migratools_lib::remote::{LocalRemote, RemoteTree};
use migratools_lib::{Migrator, Node};
use tempfile::tempdir;

fn local_remote(path: &std::path::Path) -> Arc<dyn RemoteTree> {
    Arc::new(LocalRemote::new(path.to_str().expect("路径非 UTF-8")).expect("创建本地树失败"))
}

fn node_by_old_path<'a>(nodes: &'a [Node], path: &str) -> &'a Node {
    nodes
        .iter()
        .find(|n| n.old_relative_path == path)
        .unwrap_or_else(|| panic!("找不到节点 {}", path))
}

#[tokio::test]
async fn full_pipeline_migrates_scenario_tree() {
    let src_root = tempdir().unwrap();
    let dst_root = tempdir().unwrap();
    let state = tempdir().unwrap();

    write_file(src_root.path(), "A/sub/f.txt", "0123456789");

    let pool = connect_pool(state.path()).await;
    let mut migrator = Migrator::new(
        pool,
        local_remote(src_root.path()),
        local_remote(dst_root.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );

    // 阶段一：三个节点且目标路径映射到 /B/ 子树
    let index = migrator.build_index().await.unwrap();
    assert_eq!(index.nodes_visited, 3);
    assert_eq!(index.nodes_modified, 3);

    let nodes = migrator.store().all().await.unwrap();
    assert_eq!(nodes.len(), 3);

    let mapped: HashSet<&str> = nodes
        .iter()
        .filter_map(|n| n.new_relative_path.as_deref())
        .collect();
    assert_eq!(
        mapped,
        HashSet::from(["/B/", "/B/sub/", "/B/sub/f.txt"])
    );

    let root = node_by_old_path(&nodes, "/A/");
    let sub = node_by_old_path(&nodes, "/A/sub/");
    let file = node_by_old_path(&nodes, "/A/sub/f.txt");
    assert_eq!(root.parent_id, None);
    assert_eq!(sub.parent_id, Some(root.id));
    assert_eq!(file.parent_id, Some(sub.id));
    assert!(root.is_dir && sub.is_dir && !file.is_dir);
    assert_eq!(file.size, 10);
    assert!(nodes.iter().all(|n| n.indexing_finished));

    // 阶段二：目标端出现同构的 /B/ 子树，所有节点 uploaded
    let transfer = migrator.move_files().await.unwrap();
    assert_eq!(transfer.files_uploaded, 1);
    assert_eq!(transfer.dirs_uploaded, 2);
    assert_eq!(transfer.bytes_transferred, 10);

    let copied = std::fs::read_to_string(dst_root.path().join("B/sub/f.txt")).unwrap();
    assert_eq!(copied, "0123456789");

    let nodes = migrator.store().all().await.unwrap();
    assert!(nodes.iter().all(|n| n.uploaded));

    // 暂存文件上传后清掉
    assert!(!state.path().join(file.id.to_string()).exists());

    // 迁移期间目标端人工上传的文件只告警不报错
    write_file(dst_root.path(), "B/manual.txt", "out of band");

    // 阶段三：每个节点都绑定目标端标识
    let reconcile = migrator.fetch_new_file_ids().await.unwrap();
    assert_eq!(reconcile.ids_bound, 3);
    assert_eq!(reconcile.misses, 1);

    let nodes = migrator.store().all().await.unwrap();
    assert!(nodes.iter().all(|n| n.new_file_id.is_some()));
}

#[tokio::test]
async fn second_index_pass_is_pruned_entirely() {
    let src_root = tempdir().unwrap();
    let state = tempdir().unwrap();

    write_file(src_root.path(), "A/sub/f.txt", "hello");
    write_file(src_root.path(), "A/other/g.txt", "world");

    let pool = connect_pool(state.path()).await;

    let first = CountingRemote::new(local_remote(src_root.path()));
    let mut migrator = Migrator::new(
        pool.clone(),
        first.clone(),
        local_remote(state.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );
    migrator.build_index().await.unwrap();
    // A、sub、other 各列一次
    assert_eq!(first.list_count(), 3);

    let rows_before = migrator.store().all().await.unwrap();

    // 无变化重跑：零次列目录，库里字段原样不动
    let second = CountingRemote::new(local_remote(src_root.path()));
    let mut migrator = Migrator::new(
        pool.clone(),
        second.clone(),
        local_remote(state.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );
    let outcome = migrator.build_index().await.unwrap();

    assert_eq!(second.list_count(), 0);
    assert_eq!(outcome.nodes_visited, 1);
    assert_eq!(outcome.nodes_modified, 0);

    let rows_after = migrator.store().all().await.unwrap();
    assert_eq!(rows_before, rows_after);
}

#[tokio::test]
async fn changed_file_relists_parent_chain_only() {
    let src_root = tempdir().unwrap();
    let state = tempdir().unwrap();

    write_file(src_root.path(), "A/sub/f.txt", "ten bytes!");
    write_file(src_root.path(), "A/other/g.txt", "untouched");

    let pool = connect_pool(state.path()).await;
    let mut migrator = Migrator::new(
        pool.clone(),
        local_remote(src_root.path()),
        local_remote(state.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );
    migrator.build_index().await.unwrap();
    let g_before = {
        let nodes = migrator.store().all().await.unwrap();
        node_by_old_path(&nodes, "/A/other/g.txt").clone()
    };

    // 文件系统时间戳是秒级的，隔开一秒再改动
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // 服务器端目录时间戳会逐级更新，本地测试里手动模拟
    write_file(src_root.path(), "A/sub/f.txt", "twenty bytes exactly");
    bump_dir(&src_root.path().join("A/sub"));
    bump_dir(&src_root.path().join("A"));

    let counting = CountingRemote::new(local_remote(src_root.path()));
    let mut migrator = Migrator::new(
        pool.clone(),
        counting.clone(),
        local_remote(state.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );
    let outcome = migrator.build_index().await.unwrap();

    // 只重新列 A 和 A/sub，other 子树不动
    assert_eq!(counting.list_count(), 2);

    let nodes = migrator.store().all().await.unwrap();
    let f = node_by_old_path(&nodes, "/A/sub/f.txt");
    let sub = node_by_old_path(&nodes, "/A/sub/");
    assert_eq!(f.size, 20);
    assert!(outcome.modified_ids.contains(&f.id));
    assert!(outcome.modified_ids.contains(&sub.id));

    let g_after = node_by_old_path(&nodes, "/A/other/g.txt");
    assert_eq!(&g_before, g_after);
}

#[tokio::test]
async fn transfer_resumes_without_refetching_staged_file() {
    let src_root = tempdir().unwrap();
    let dst_root = tempdir().unwrap();
    let state = tempdir().unwrap();

    write_file(src_root.path(), "A/f1.txt", "first file");
    write_file(src_root.path(), "A/f2.txt", "second file");
    write_file(src_root.path(), "A/f3.txt", "third file");

    let pool = connect_pool(state.path()).await;
    let mut migrator = Migrator::new(
        pool.clone(),
        local_remote(src_root.path()),
        local_remote(dst_root.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );
    migrator.build_index().await.unwrap();

    let nodes = migrator.store().all().await.unwrap();
    let f1 = node_by_old_path(&nodes, "/A/f1.txt");
    let f2 = node_by_old_path(&nodes, "/A/f2.txt");

    // 模拟一次中断：f1 已下载到暂存但尚未上传，f2 整个已完成
    std::fs::write(state.path().join(f1.id.to_string()), "staged bytes").unwrap();
    migrator.store().set_downloaded(f1.id).await.unwrap();
    migrator.store().set_uploaded(f2.id).await.unwrap();

    let counting = CountingRemote::new(local_remote(src_root.path()));
    let migrator = Migrator::new(
        pool.clone(),
        counting.clone(),
        local_remote(dst_root.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );
    let outcome = migrator.move_files().await.unwrap();

    // 只有 f3 需要下载；f1 直接用暂存内容，f2 跳过
    assert_eq!(counting.fetch_count(), 1);
    assert_eq!(outcome.files_uploaded, 2);
    assert_eq!(outcome.nodes_skipped, 1);

    let f1_copied = std::fs::read_to_string(dst_root.path().join("B/f1.txt")).unwrap();
    assert_eq!(f1_copied, "staged bytes");
    assert!(dst_root.path().join("B/f3.txt").exists());
    assert!(!dst_root.path().join("B/f2.txt").exists());

    assert!(!state.path().join(f1.id.to_string()).exists());

    let nodes = migrator.store().all().await.unwrap();
    assert!(nodes.iter().all(|n| n.uploaded));
}

#[tokio::test]
async fn repeated_indexing_keeps_tree_invariants() {
    let src_root = tempdir().unwrap();
    let state = tempdir().unwrap();

    write_file(src_root.path(), "A/d1/x.txt", "x");
    write_file(src_root.path(), "A/d1/d2/y.txt", "y");
    write_file(src_root.path(), "A/z.txt", "z");

    let pool = connect_pool(state.path()).await;
    let mut migrator = Migrator::new(
        pool.clone(),
        local_remote(src_root.path()),
        local_remote(state.path()),
        "/A/",
        "/B/",
        state.path().to_path_buf(),
    );
    migrator.build_index().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    write_file(src_root.path(), "A/d1/new.txt", "new");
    bump_dir(&src_root.path().join("A"));
    migrator.build_index().await.unwrap();

    let nodes = migrator.store().all().await.unwrap();

    // 唯一根节点
    let roots: Vec<&Node> = nodes.iter().filter(|n| n.parent_id.is_none()).collect();
    assert_eq!(roots.len(), 1);
    let root_id = roots[0].id;

    // 父引用指向目录节点，且沿父链必达根、无环
    for node in &nodes {
        if let Some(parent_id) = node.parent_id {
            let parent = nodes.iter().find(|n| n.id == parent_id).expect("父节点存在");
            assert!(parent.is_dir);
        }

        let mut current = node.id;
        let mut hops = 0;
        while let Some(n) = nodes.iter().find(|n| n.id == current) {
            match n.parent_id {
                None => break,
                Some(p) => {
                    current = p;
                    hops += 1;
                    assert!(hops <= nodes.len(), "父链出现环");
                }
            }
        }
        assert_eq!(current, root_id);
    }

    // 标识与路径均唯一
    let old_ids: HashSet<&str> = nodes.iter().map(|n| n.old_file_id.as_str()).collect();
    assert_eq!(old_ids.len(), nodes.len());

    let new_paths: Vec<&str> = nodes
        .iter()
        .filter_map(|n| n.new_relative_path.as_deref())
        .collect();
    let unique_new_paths: HashSet<&&str> = new_paths.iter().collect();
    assert_eq!(unique_new_paths.len(), new_paths.len());
}
